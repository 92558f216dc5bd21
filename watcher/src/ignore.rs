use regex::Regex;
use std::path::Path;

/// Matches any dotfile or anything below a dot-directory.
pub const DOTFILES: &str = r"(^|/)\.";

/// Path filter applied to raw events before they reach the settle queue.
///
/// The pattern is matched against the path relative to the watch root, with
/// components joined by `/` on every platform, so a root that itself lives
/// under a dot-directory does not hide the whole tree.
#[derive(Debug, Clone)]
pub struct IgnoreRule {
    pattern: Regex,
}

impl IgnoreRule {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }

    pub fn is_ignored(&self, root: &Path, path: &Path) -> bool {
        let relative = path.strip_prefix(root).unwrap_or(path);
        let joined = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        !joined.is_empty() && self.pattern.is_match(&joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotfiles_are_ignored_at_any_depth() {
        let rule = IgnoreRule::new(DOTFILES).unwrap();
        let root = Path::new("/work/sketch/src");
        assert!(rule.is_ignored(root, Path::new("/work/sketch/src/.DS_Store")));
        assert!(rule.is_ignored(root, Path::new("/work/sketch/src/.git/index")));
        assert!(rule.is_ignored(root, Path::new("/work/sketch/src/lib/.main.ts.swp")));
        assert!(!rule.is_ignored(root, Path::new("/work/sketch/src/main.ts")));
        assert!(!rule.is_ignored(root, Path::new("/work/sketch/src/lib/shapes.ts")));
    }

    #[test]
    fn dot_directory_above_root_does_not_hide_tree() {
        let rule = IgnoreRule::new(DOTFILES).unwrap();
        let root = Path::new("/home/me/.config/sketch");
        assert!(!rule.is_ignored(root, Path::new("/home/me/.config/sketch/main.ts")));
    }

    #[test]
    fn root_itself_is_never_ignored() {
        let rule = IgnoreRule::new(DOTFILES).unwrap();
        let root = Path::new("/work/.hidden");
        assert!(!rule.is_ignored(root, root));
    }

    #[test]
    fn custom_pattern() {
        let rule = IgnoreRule::new(r"(~$|\.tmp$|(^|/)node_modules/)").unwrap();
        let root = Path::new("/w");
        assert!(rule.is_ignored(root, Path::new("/w/main.ts~")));
        assert!(rule.is_ignored(root, Path::new("/w/4913.tmp")));
        assert!(rule.is_ignored(root, Path::new("/w/node_modules/x/index.js")));
        assert!(!rule.is_ignored(root, Path::new("/w/main.ts")));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(IgnoreRule::new("(unclosed").is_err());
    }
}
