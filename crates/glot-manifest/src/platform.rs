//! Platform tags used by descriptor and package version filters.

/// The tag describing the platform this runtime was built for.
pub fn current() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "macos"
    } else {
        "linux"
    }
}

/// An empty platform list means "supported everywhere".
pub fn supports(platforms: &[String]) -> bool {
    platforms.is_empty() || platforms.iter().any(|p| p == current())
}
