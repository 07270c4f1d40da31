/// Characters that are invalid in filenames on common filesystems
const INVALID_CHARS: &[char] = &['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

/// Replace filesystem-hostile characters with `_`, everything else is kept
pub fn safe_filename(name: &str) -> String {
    name.chars()
        .map(|c| if INVALID_CHARS.contains(&c) { '_' } else { c })
        .collect()
}
