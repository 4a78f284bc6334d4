/// Public handle derivation
///
/// `Ada Lovelace` becomes `ada-lovelace-x7Kq2p`. The suffix keeps handles
/// distinct for people sharing a name; there is no retry on collision.

/// Length of the random handle suffix
pub const HANDLE_SUFFIX_LENGTH: usize = 6;

/// Lower-case the trimmed name, join whitespace runs with a hyphen and
/// append `-<suffix>`
pub fn derive_handle(name: &str, suffix: &str) -> String {
    let base = name
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-");

    format!("{}-{}", base, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_handle() {
        assert_eq!(derive_handle("Ada Lovelace", "x7Kq2p"), "ada-lovelace-x7Kq2p");
        assert_eq!(derive_handle("  Grace   Brewster  Hopper ", "abc123"), "grace-brewster-hopper-abc123");
        assert_eq!(derive_handle("ada", "zzzzzz"), "ada-zzzzzz");
    }

    #[test]
    fn test_handle_keeps_suffix_case() {
        let handle = derive_handle("Ada", "AbCdEf");
        assert!(handle.ends_with("-AbCdEf"));
        assert!(handle.starts_with("ada"));
    }
}
