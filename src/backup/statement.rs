use crate::backup::backupter_config::ToolPaths;
use crate::backup::process::CommandLine;
use std::path::Path;

pub const DEFAULT_PRINCIPAL: &str = "postgres";

/// Builds the dump command for `database`, run as `principal`, with the
/// dump written to `artifact`.
///
/// Renders as `sudo -u <principal> pg_dump <database> > <artifact>`. The
/// database identifier is passed as a single argument and never goes
/// through a shell.
pub fn dump_statement(
    tools: &ToolPaths,
    artifact: &Path,
    database: &str,
    principal: &str,
) -> CommandLine {
    CommandLine::new(tools.sudo())
        .arg("-u")
        .arg(principal)
        .arg(tools.pg_dump().as_os_str())
        .arg(database)
        .stdout_to(artifact)
}
