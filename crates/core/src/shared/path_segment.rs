use std::path::{Component, Path};

/// True if `name` is exactly one plain path component, so joining it onto a
/// directory can never leave that directory.
pub fn is_single_segment(name: &str) -> bool {
    if name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
