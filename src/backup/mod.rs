pub mod backupter_config;
pub mod dump;
pub mod events;
pub mod handlers;
pub mod job;
pub mod lock;
pub mod notifications;
pub mod process;
pub mod redacted;
pub mod remote_sync;
pub mod result_error;
pub mod retention;
pub mod statement;
pub mod tier;
pub mod validate;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
