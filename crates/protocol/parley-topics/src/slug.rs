//! Topic id normalization.

/// Slug-normalize a conversation name: lowercase, every run of
/// non-alphanumeric characters becomes one `-`, leading and trailing `-`
/// stripped.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            for lower in c.to_lowercase() {
                out.push(lower);
            }
        } else {
            pending_dash = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_dashes() {
        assert_eq!(slugify("Project Discuss"), "project-discuss");
    }

    #[test]
    fn collapses_runs_and_trims() {
        assert_eq!(slugify("  Hello,   World!! "), "hello-world");
        assert_eq!(slugify("--already--dashed--"), "already-dashed");
    }

    #[test]
    fn keeps_digits() {
        assert_eq!(slugify("Q3 2025 planning"), "q3-2025-planning");
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(slugify("!!!"), "");
    }
}
