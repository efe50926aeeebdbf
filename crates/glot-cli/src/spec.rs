//! `name@version` package spec parsing.

use glot_logger as logger;

/// Split a `name[@version]` spec. A malformed version is reported and
/// treated as absent.
pub fn parse(spec: &str) -> (String, Option<i32>) {
    match spec.split_once('@') {
        None => (spec.to_string(), None),
        Some((name, version)) => match version.parse::<i32>() {
            Ok(version) => (name.to_string(), Some(version)),
            Err(_) => {
                logger::warn(&format!(
                    "Ignoring malformed version '{}' in '{}'",
                    version, spec
                ));
                (name.to_string(), None)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_name_has_no_version() {
        assert_eq!(parse("lua"), ("lua".to_string(), None));
    }

    #[test]
    fn at_version_is_split() {
        assert_eq!(parse("lua@5"), ("lua".to_string(), Some(5)));
    }

    #[test]
    fn malformed_version_is_dropped() {
        glot_logger::set_severity(glot_logger::Severity::None);
        assert_eq!(parse("lua@latest"), ("lua".to_string(), None));
    }
}
