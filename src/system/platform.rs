// src/system/platform.rs

/// The target platform rules for environment handling.
///
/// Kept as a value rather than a `cfg!` check at every use so the Windows rules
/// can be exercised on any host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Unix,
}

const COMMON_PATH_LISTS: &[&str] = &["PATH"];
const WINDOWS_PATH_LISTS: &[&str] = &["INCLUDE", "LIB", "LIBPATH", "EXTERNAL_INCLUDE", "PSModulePath"];
const UNIX_PATH_LISTS: &[&str] = &[
    "LD_LIBRARY_PATH",
    "DYLD_LIBRARY_PATH",
    "PKG_CONFIG_PATH",
    "CMAKE_PREFIX_PATH",
];

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }

    pub fn list_delimiter(self) -> char {
        match self {
            Platform::Windows => ';',
            Platform::Unix => ':',
        }
    }

    /// Environment variable names are case-insensitive on Windows.
    pub fn same_variable(self, a: &str, b: &str) -> bool {
        match self {
            Platform::Windows => a.eq_ignore_ascii_case(b),
            Platform::Unix => a == b,
        }
    }

    /// Whether `name` holds a delimited list of search paths.
    pub fn is_path_list(self, name: &str) -> bool {
        let specific = match self {
            Platform::Windows => WINDOWS_PATH_LISTS,
            Platform::Unix => UNIX_PATH_LISTS,
        };
        COMMON_PATH_LISTS
            .iter()
            .chain(specific)
            .any(|known| self.same_variable(known, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_list_names() {
        assert!(Platform::Unix.is_path_list("PATH"));
        assert!(Platform::Unix.is_path_list("LD_LIBRARY_PATH"));
        assert!(!Platform::Unix.is_path_list("Path"));
        assert!(!Platform::Unix.is_path_list("INCLUDE"));

        assert!(Platform::Windows.is_path_list("Path"));
        assert!(Platform::Windows.is_path_list("include"));
        assert!(Platform::Windows.is_path_list("LIBPATH"));
        assert!(!Platform::Windows.is_path_list("HOME"));
    }
}
