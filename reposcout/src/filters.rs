/// File filtering used by the local searcher when it walks a repository.
///
/// These are free functions rather than a trait; the local searcher is the only caller and
/// never needs to swap filtering strategies at runtime.
use glob::Pattern;
use std::path::Path;

/// Checks if a file should be ignored based on ignore patterns
pub fn should_ignore(path: &Path, ignore_patterns: &[String]) -> bool {
    let normalized_path = path.to_string_lossy().replace('\\', "/");

    // Always ignore target/ and .git/ directories
    if normalized_path.contains("/target/")
        || normalized_path.contains("/.git/")
        || normalized_path.starts_with("target/")
        || normalized_path.starts_with(".git/")
    {
        return true;
    }

    ignore_patterns.iter().any(|pattern| {
        Pattern::new(pattern)
            .map(|p| p.matches(&normalized_path))
            .unwrap_or(false)
    })
}

/// Checks if a file is likely to be binary
pub fn is_likely_binary(path: &Path) -> bool {
    const BINARY_EXTENSIONS: &[&str] = &[
        "exe", "dll", "so", "dylib", "bin", "obj", "o", "class", "jar", "war", "ear", "png", "jpg",
        "jpeg", "gif", "bmp", "ico", "pdf", "doc", "docx", "xls", "xlsx", "zip", "tar", "gz", "7z",
        "rar",
    ];

    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            BINARY_EXTENSIONS
                .iter()
                .any(|bin_ext| bin_ext.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Determines if a file should be indexed by the local searcher
pub fn should_include_file(path: &Path, ignore_patterns: &[String]) -> bool {
    !is_likely_binary(path) && !should_ignore(path, ignore_patterns)
}
