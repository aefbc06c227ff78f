//! Crate sources stay within the 100 column width used by rustfmt.

use ignore::WalkBuilder;
use std::path::Path;

const MAX_WIDTH: usize = 100;

#[test]
fn test_source_lines_fit_max_width() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let mut too_wide = Vec::new();

    for dir in ["src", "tests", "benches"] {
        for entry in WalkBuilder::new(root.join(dir)).build().flatten() {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "rs") {
                continue;
            }
            let content = std::fs::read_to_string(path).expect("read source file");
            for (index, line) in content.lines().enumerate() {
                if line.chars().count() > MAX_WIDTH {
                    too_wide.push(format!("{}:{}", path.display(), index + 1));
                }
            }
        }
    }

    assert!(too_wide.is_empty(), "lines wider than {MAX_WIDTH}: {too_wide:?}");
}
