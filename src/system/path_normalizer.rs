// src/system/path_normalizer.rs

use std::collections::HashSet;
use thiserror::Error;

use crate::system::platform::Platform;

/// A short (8.3) path lookup failed. Never fatal: the segment is kept as-is.
#[derive(Error, Debug)]
#[error("Could not resolve short path for '{segment}': {source}")]
pub struct ShortPathError {
    pub segment: String,
    #[source]
    pub source: std::io::Error,
}

/// Resolves a long path segment to its short form.
pub type ShortPathResolver = fn(&str) -> Result<String, ShortPathError>;

/// Normalizes the value of a path-list variable so it can be applied over and
/// over without growing.
///
/// Segments are deduplicated keeping the first occurrence, which preserves the
/// shadowing order a toolchain script sets up when it prepends its own
/// directories. On Windows, segments with spaces are shortened to their 8.3
/// form because many downstream invocations are assembled by naive string
/// concatenation.
#[derive(Debug, Clone, Copy)]
pub struct PathListNormalizer {
    platform: Platform,
    resolver: Option<ShortPathResolver>,
}

impl PathListNormalizer {
    pub fn new(platform: Platform) -> Self {
        let resolver = match platform {
            Platform::Windows => Some(system_short_path as ShortPathResolver),
            Platform::Unix => None,
        };
        Self { platform, resolver }
    }

    /// Overrides the short path lookup. Only consulted on Windows.
    pub fn with_resolver(mut self, resolver: ShortPathResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn normalize(&self, value: &str) -> String {
        let delimiter = self.platform.list_delimiter();
        let mut seen = HashSet::new();
        let mut kept: Vec<String> = Vec::new();

        for segment in value.split(delimiter).filter(|s| !s.is_empty()) {
            let segment = self.shorten(segment);
            if seen.insert(self.dedup_key(&segment)) {
                kept.push(segment);
            }
        }

        kept.join(&delimiter.to_string())
    }

    fn shorten(&self, segment: &str) -> String {
        if self.platform != Platform::Windows || !segment.contains(' ') {
            return segment.to_string();
        }
        let Some(resolver) = self.resolver else {
            return segment.to_string();
        };
        match resolver(segment) {
            Ok(short) if !short.is_empty() => short,
            Ok(_) => segment.to_string(),
            Err(e) => {
                log::warn!("{}", e);
                segment.to_string()
            }
        }
    }

    fn dedup_key(&self, segment: &str) -> String {
        match self.platform {
            Platform::Windows => segment.trim_end_matches(['\\', '/']).to_lowercase(),
            Platform::Unix => segment.to_string(),
        }
    }
}

#[cfg(windows)]
fn system_short_path(segment: &str) -> Result<String, ShortPathError> {
    use std::ffi::{OsStr, OsString};
    use std::os::windows::ffi::{OsStrExt, OsStringExt};
    use windows_sys::Win32::Storage::FileSystem::GetShortPathNameW;

    let to_error = |source: std::io::Error| ShortPathError {
        segment: segment.to_string(),
        source,
    };

    let wide: Vec<u16> = OsStr::new(segment)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();

    // SAFETY: `wide` is NUL-terminated; a null buffer with length 0 queries the required size.
    let required = unsafe { GetShortPathNameW(wide.as_ptr(), std::ptr::null_mut(), 0) };
    if required == 0 {
        return Err(to_error(std::io::Error::last_os_error()));
    }

    let mut buffer = vec![0u16; required as usize];
    // SAFETY: `buffer` holds `required` u16 slots as reported by the previous call.
    let written = unsafe { GetShortPathNameW(wide.as_ptr(), buffer.as_mut_ptr(), required) };
    if written == 0 || written >= required {
        return Err(to_error(std::io::Error::last_os_error()));
    }
    buffer.truncate(written as usize);
    Ok(OsString::from_wide(&buffer).to_string_lossy().into_owned())
}

#[cfg(not(windows))]
fn system_short_path(segment: &str) -> Result<String, ShortPathError> {
    Err(ShortPathError {
        segment: segment.to_string(),
        source: std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "short paths only exist on Windows",
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fake_short(segment: &str) -> Result<String, ShortPathError> {
        if segment.contains("missing") {
            return Err(ShortPathError {
                segment: segment.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            });
        }
        Ok(segment.replace("Program Files", "PROGRA~1"))
    }

    #[test]
    fn test_first_occurrence_wins() {
        let normalizer = PathListNormalizer::new(Platform::Unix);
        assert_eq!(normalizer.normalize("/a:/b:/a:/c"), "/a:/b:/c");
    }

    #[test]
    fn test_empty_segments_are_dropped() {
        let normalizer = PathListNormalizer::new(Platform::Unix);
        assert_eq!(normalizer.normalize("::/a::/b:"), "/a:/b");
        assert_eq!(normalizer.normalize(""), "");
    }

    #[test]
    fn test_unix_keeps_spaces_and_case() {
        let normalizer = PathListNormalizer::new(Platform::Unix);
        assert_eq!(normalizer.normalize("/opt/My Tools:/opt/my tools"), "/opt/My Tools:/opt/my tools");
    }

    #[test]
    fn test_windows_dedup_ignores_case_and_trailing_separator() {
        let normalizer = PathListNormalizer::new(Platform::Windows).with_resolver(fake_short);
        assert_eq!(
            normalizer.normalize(r"C:\Tools;c:\tools\;C:\Other"),
            r"C:\Tools;C:\Other"
        );
    }

    #[test]
    fn test_windows_shortens_segments_with_spaces() {
        let normalizer = PathListNormalizer::new(Platform::Windows).with_resolver(fake_short);
        assert_eq!(
            normalizer.normalize(r"C:\Program Files\CMake\bin;C:\bin"),
            r"C:\PROGRA~1\CMake\bin;C:\bin"
        );
    }

    #[test]
    fn test_windows_failed_lookup_keeps_segment() {
        let normalizer = PathListNormalizer::new(Platform::Windows).with_resolver(fake_short);
        assert_eq!(
            normalizer.normalize(r"C:\missing dir;C:\bin"),
            r"C:\missing dir;C:\bin"
        );
    }

    #[test]
    fn test_windows_long_and_short_forms_dedup() {
        let normalizer = PathListNormalizer::new(Platform::Windows).with_resolver(fake_short);
        assert_eq!(
            normalizer.normalize(r"C:\PROGRA~1\Git;C:\Program Files\Git"),
            r"C:\PROGRA~1\Git"
        );
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(segments in prop::collection::vec("[a-c/ ]{0,4}", 0..8)) {
            let value = segments.join(":");
            let normalizer = PathListNormalizer::new(Platform::Unix);
            let once = normalizer.normalize(&value);
            prop_assert_eq!(normalizer.normalize(&once), once);
        }

        #[test]
        fn prop_windows_normalize_is_idempotent(segments in prop::collection::vec("[A-Ca-c\\\\ ]{0,5}", 0..8)) {
            let value = segments.join(";");
            let normalizer = PathListNormalizer::new(Platform::Windows).with_resolver(fake_short);
            let once = normalizer.normalize(&value);
            prop_assert_eq!(normalizer.normalize(&once), once);
        }
    }
}
