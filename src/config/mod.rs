pub mod paths;
pub mod profile;

pub use profile::{AuthMethod, ConnectionProfile, Identity};

use std::io::Write;
use std::path::Path;

/// Write a file atomically: write to a sibling temp file, then rename over
/// the target. Prevents a torn trust store if the process dies mid-write.
pub fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)
}
