use layerfs::LayerSource;
use std::fs;
use std::path::Path;

/// Write `<filesystem>{body}</filesystem>` to `dir/name` and return its source
pub fn write_layer(dir: &Path, name: &str, body: &str) -> LayerSource {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, format!("<filesystem>{}</filesystem>", body)).unwrap();
    LayerSource::file(&path)
}
