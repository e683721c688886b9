use std::path::Path;
use std::process::Command;

use log::debug;

use crate::errors::{Error, Result};

/// Name of the environment variable that carries extra arguments for the
/// host sort utility.
pub const SORT_ARGS_ENV_VAR: &str = "SOMFILTER_SORT_ARGS";

/// Characters permitted in `SOMFILTER_SORT_ARGS`: spaces, digits, letters,
/// `-`, `/`.
fn is_allowed_sort_arg_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == ' ' || c == '-' || c == '/'
}

fn extra_sort_args() -> Result<Vec<String>> {
    match std::env::var(SORT_ARGS_ENV_VAR) {
        Ok(value) => {
            if !value.chars().all(is_allowed_sort_arg_char) {
                return Err(Error::InvalidSortArgs(value));
            }
            Ok(value.split_whitespace().map(str::to_owned).collect())
        }
        Err(_) => Ok(Vec::new()),
    }
}

/// Sort `input` numerically by the given 1-based `key_column` (tab
/// delimited) into `output`, delegating to the host `sort` utility. This is
/// the pragmatic strategy for inputs too large to sort in memory.
pub fn sort_file_by_key(input: &Path, output: &Path, key_column: usize) -> Result<()> {
    let extra_args = extra_sort_args()?;
    debug!(
        "external sort: {} -> {} (key column {key_column}, extra args {:?})",
        input.display(),
        output.display(),
        extra_args
    );
    let status = Command::new("sort")
        .arg("-t")
        .arg("\t")
        .arg("-k")
        .arg(format!("{key_column},{key_column}"))
        .arg("-n")
        .arg("-o")
        .arg(output)
        .args(&extra_args)
        .arg(input)
        .status()?;
    if !status.success() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("external sort exited with status {status}"),
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsafe_sort_args() {
        std::env::set_var(SORT_ARGS_ENV_VAR, "--parallel=4; rm -rf /");
        let err = extra_sort_args().unwrap_err();
        assert!(matches!(err, Error::InvalidSortArgs(_)));
        std::env::remove_var(SORT_ARGS_ENV_VAR);
    }

    #[test]
    fn accepts_conservative_sort_args() {
        std::env::set_var(SORT_ARGS_ENV_VAR, "--parallel=4 -S 10%");
        // '%' and '=' are not in the allowed class on purpose; use a
        // purely-safe example instead.
        std::env::set_var(SORT_ARGS_ENV_VAR, "--parallel 4");
        let args = extra_sort_args().unwrap();
        assert_eq!(args, vec!["--parallel".to_owned(), "4".to_owned()]);
        std::env::remove_var(SORT_ARGS_ENV_VAR);
    }
}
