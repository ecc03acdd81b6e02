//! JSON snapshot files backing [`MemoryStore`] for the CLI.

use super::memory::{MemoryStore, StoreSnapshot};
use anyhow::Context;
use camino::Utf8Path;
use fs_err as fs;
use tracing::debug;

/// Load a store snapshot from `path`.
pub fn load_snapshot(path: &Utf8Path) -> anyhow::Result<MemoryStore> {
    let contents = fs::read_to_string(path).with_context(|| format!("read snapshot {}", path))?;
    let snapshot: StoreSnapshot =
        serde_json::from_str(&contents).with_context(|| format!("parse snapshot {}", path))?;
    debug!(
        path = %path,
        namespaces = snapshot.namespaces.len(),
        "loaded store snapshot"
    );
    Ok(MemoryStore::from_snapshot(snapshot))
}

/// Write the current store contents back to `path`, replacing it atomically.
pub fn save_snapshot(path: &Utf8Path, store: &MemoryStore) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&store.snapshot()).context("serialize snapshot")?;
    write_atomic(path, json.as_bytes())
}

pub(crate) fn write_atomic(path: &Utf8Path, contents: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create parent dir for {}", path))?;
        }
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents).with_context(|| format!("write {}", tmp))?;
    fs::rename(&tmp, path).with_context(|| format!("rename {} -> {}", tmp, path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::IndexPort;
    use camino::Utf8PathBuf;
    use driftfix_types::{IndexRecord, Namespace};
    use tempfile::TempDir;

    fn utf8_dir(tmp: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf8")
    }

    #[test]
    fn save_then_load_preserves_contents() {
        let tmp = TempDir::new().expect("temp dir");
        let path = utf8_dir(&tmp).join("store.json");

        let store = MemoryStore::new();
        store.insert_entity("app", "u1");
        store.insert_index_entry("app", "users", IndexRecord::new("u1", "0"));
        store.insert_index_entry("app", "users", IndexRecord::new("ghost", "0"));
        save_snapshot(&path, &store).expect("save");

        let loaded = load_snapshot(&path).expect("load");
        assert_eq!(loaded.snapshot(), store.snapshot());
        let page = loaded
            .fetch_index_page(&Namespace::new("app"), "users", None, 10)
            .expect("page");
        assert_eq!(page.len(), 2);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn unsorted_snapshot_is_normalized_on_load() {
        let tmp = TempDir::new().expect("temp dir");
        let path = utf8_dir(&tmp).join("store.json");
        fs::write(
            &path,
            r#"{"namespaces":{"app":{"collections":{"users":{"index":[
                {"id":"b","bucket":"0"},{"id":"a","bucket":"0"}
            ]}}}}}"#,
        )
        .expect("write");

        let store = load_snapshot(&path).expect("load");
        let ids: Vec<String> = store
            .index_entries(&Namespace::new("app"), "users")
            .into_iter()
            .map(|r| r.id.to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn missing_file_names_the_path() {
        let tmp = TempDir::new().expect("temp dir");
        let path = utf8_dir(&tmp).join("absent.json");
        let err = load_snapshot(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("absent.json"));
    }
}
