use crate::backup::result_error::error::Error;
use crate::backup::result_error::{WithFnName, WithMsg};

pub type Result<T> = std::result::Result<T, Error>;

impl<R, S: Into<String>> WithFnName<S> for Result<R> {
    fn with_fn_name(self, fn_name: S) -> Self {
        self.map_err(|e| e.with_fn_name(fn_name))
    }
}

impl<R, S: Into<String>> WithMsg<S> for Result<R> {
    fn with_msg(self, msg: S) -> Self {
        self.map_err(|e| e.with_msg(msg))
    }
}

pub fn convert_error_vec(errors: Vec<Error>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_error_vec_empty_is_ok() {
        assert!(convert_error_vec(vec![]).is_ok());
    }

    #[test]
    fn test_convert_error_vec_keeps_every_error() {
        let res = convert_error_vec(vec![
            Error::invalid_cron("a"),
            Error::invalid_cron("b"),
        ]);
        match res {
            Err(Error::LotsOfError(v)) => assert_eq!(v.len(), 2),
            other => panic!("Expected LotsOfError, got {other:?}"),
        }
    }

    #[test]
    fn test_result_add_msg_only_touches_err() {
        let ok: Result<u8> = Ok(1);
        assert_eq!(ok.with_msg("unused").unwrap(), 1);

        let err: Result<u8> = Err(Error::invalid_cron("* *"));
        let msg = err.with_msg("Loading schedule").unwrap_err().to_string();
        assert!(msg.starts_with("Loading schedule:"));
    }
}
