// ==========================================
// 楼宇自控数据导入 - 上传文件存储
// ==========================================
// 布局: <root>/imports/<import_id>/<清洗后的原文件名>
// 红线: 原始字节原样保存；key 使用 '/' 分隔的相对路径
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 由导入 ID 与原文件名生成存储 key
    pub fn key_for(import_id: &str, original_filename: &str) -> String {
        format!("imports/{}/{}", import_id, sanitize_filename(original_filename))
    }

    pub fn path_for(&self, key: &str) -> ImportResult<PathBuf> {
        let mut path = self.root.clone();
        for segment in key.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(ImportError::validation("file_key", format!("invalid storage key '{}'", key)));
            }
            path.push(segment);
        }
        Ok(path)
    }

    /// 写入原始字节
    pub fn save(&self, key: &str, bytes: &[u8]) -> ImportResult<PathBuf> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        debug!(key, size = bytes.len(), "upload stored");
        Ok(path)
    }

    pub fn read(&self, key: &str) -> ImportResult<Vec<u8>> {
        Ok(fs::read(self.path_for(key)?)?)
    }

    /// 读取前 limit 个字节（预览/检测用）
    pub fn read_prefix(&self, key: &str, limit: usize) -> ImportResult<Vec<u8>> {
        let file = fs::File::open(self.path_for(key)?)?;
        let mut buf = Vec::with_capacity(limit.min(64 * 1024));
        file.take(limit as u64).read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// 删除文件及其空目录（上传事务失败时回滚用）
    pub fn remove(&self, key: &str) -> ImportResult<()> {
        let path = self.path_for(key)?;
        if path.exists() {
            fs::remove_file(&path)?;
        }
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::remove_dir(parent) {
                warn!(dir = %parent.display(), error = %e, "upload directory not removed");
            }
        }
        Ok(())
    }
}

/// 仅保留文件名部分，非 [A-Za-z0-9._-] 字符替换为 '_'
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("trend data (1).csv"), "trend_data__1_.csv");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\exports\\ahu.xlsx"), "ahu.xlsx");
        assert_eq!(sanitize_filename(".."), "upload");
    }

    #[test]
    fn test_save_read_remove() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        let key = FileStore::key_for("imp-1", "Température.csv");
        assert_eq!(key, "imports/imp-1/Temp_rature.csv");

        let path = store.save(&key, b"a,b\n1,2\n").unwrap();
        assert!(path.starts_with(dir.path()));
        assert_eq!(store.read(&key).unwrap(), b"a,b\n1,2\n");
        assert_eq!(store.read_prefix(&key, 3).unwrap(), b"a,b");

        store.remove(&key).unwrap();
        assert!(!path.exists());
        assert!(!dir.path().join("imports/imp-1").exists());
    }

    #[test]
    fn test_rejects_traversal_key() {
        let store = FileStore::new("/tmp/never-used");
        assert!(store.path_for("imports/../secret").is_err());
    }
}
