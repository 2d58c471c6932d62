use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tempfile::TempPath;

use crate::domain::ContentKey;
use crate::error::CacheError;

/// 临时产物文件名中的标记；带此标记的文件永远不是缓存条目
const PART_MARKER: &str = ".part";

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub dir: PathBuf,
    /// 缓存预算（字节）
    pub max_bytes: u64,
    /// 缓存文件扩展名
    pub ext: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: ContentKey,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub last_access: SystemTime,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EvictionReport {
    pub removed_files: usize,
    pub removed_bytes: u64,
    pub failed: usize,
    pub remaining_bytes: u64,
}

/// 内容 key -> 已校验的本地文件
///
/// 目录布局 `<dir>/<key>.<ext>`，不维护索引文件：目录列表 + stat 就是索引，
/// 每次操作都重新读取，外部清理或进程崩溃后无需修复。
#[derive(Debug)]
pub struct CacheStore {
    dir: PathBuf,
    ext: String,
    max_bytes: u64,
}

impl CacheStore {
    pub fn open(config: CacheConfig) -> Result<Self, CacheError> {
        fs::create_dir_all(&config.dir).map_err(|source| CacheError::DirUnavailable {
            path: config.dir.clone(),
            source,
        })?;

        let store = Self {
            dir: config.dir,
            ext: config.ext,
            max_bytes: config.max_bytes,
        };
        let swept = store.sweep_stale_temps();
        tracing::info!(
            dir = %store.dir.display(),
            max_bytes = store.max_bytes,
            swept,
            "音频缓存已打开"
        );
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn path_for(&self, key: &ContentKey) -> PathBuf {
        self.dir.join(key.file_name(&self.ext))
    }

    pub async fn has(&self, key: &ContentKey) -> bool {
        tokio::fs::metadata(self.path_for(key))
            .await
            .is_ok_and(|md| md.is_file())
    }

    /// 刷新最近访问时间（文件 mtime）
    pub async fn touch(&self, key: &ContentKey) -> Result<(), CacheError> {
        let path = self.path_for(key);
        tokio::task::spawn_blocking(move || set_mtime(&path, SystemTime::now()))
            .await
            .map_err(io::Error::other)??;
        Ok(())
    }

    /// 读取目录得到当前全部缓存条目
    pub async fn scan(&self) -> Result<Vec<CacheEntry>, CacheError> {
        let mut rd = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|source| CacheError::Scan { source })?;

        let mut entries = Vec::new();
        while let Some(ent) = rd
            .next_entry()
            .await
            .map_err(|source| CacheError::Scan { source })?
        {
            let path = ent.path();
            let Some(key) = self.entry_key(&path) else {
                continue;
            };
            // 文件可能在列目录之后被删掉
            let md = match ent.metadata().await {
                Ok(md) => md,
                Err(e) => {
                    tracing::debug!(path = %path.display(), err = %e, "读取缓存文件信息失败");
                    continue;
                }
            };
            if !md.is_file() {
                continue;
            }
            entries.push(CacheEntry {
                key,
                path,
                size_bytes: md.len(),
                last_access: md.modified().unwrap_or(UNIX_EPOCH),
            });
        }
        Ok(entries)
    }

    pub async fn usage(&self) -> Result<u64, CacheError> {
        Ok(self.scan().await?.iter().map(|e| e.size_bytes).sum())
    }

    /// 为 key 分配一个临时产物路径；未提交就 drop 时自动删除
    pub fn temp_artifact(&self, key: &ContentKey) -> Result<TempPath, CacheError> {
        let file = tempfile::Builder::new()
            .prefix(&format!("{key}."))
            .suffix(PART_MARKER)
            .tempfile_in(&self.dir)?;
        Ok(file.into_temp_path())
    }

    /// 删除拉取器围绕临时产物留下的中间文件（`<artifact>.*`），返回删除数量
    ///
    /// 每个临时产物的文件名都带随机后缀，只会命中这一次下载自己的文件。
    pub async fn discard_leftovers(&self, artifact: &Path) -> usize {
        let Some(prefix) = artifact
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| format!("{n}."))
        else {
            return 0;
        };
        let mut rd = match tokio::fs::read_dir(&self.dir).await {
            Ok(rd) => rd,
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), err = %e, "读取缓存目录失败");
                return 0;
            }
        };

        let mut removed = 0usize;
        while let Ok(Some(ent)) = rd.next_entry().await {
            let is_leftover = ent
                .file_name()
                .to_str()
                .is_some_and(|n| n.starts_with(&prefix));
            if !is_leftover {
                continue;
            }
            let path = ent.path();
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %path.display(), err = %e, "删除下载中间文件失败"),
            }
        }
        removed
    }

    /// 原子地把临时产物改名为正式缓存文件
    pub fn commit(&self, key: &ContentKey, tmp: TempPath) -> Result<PathBuf, CacheError> {
        let final_path = self.path_for(key);
        tmp.persist(&final_path).map_err(|e| CacheError::Commit {
            key: key.to_string(),
            source: e.error,
        })?;
        Ok(final_path)
    }

    /// 按最近访问时间从旧到新删除，直到总大小不超过预算；跳过下载中的 key
    ///
    /// 删除失败只记录日志，条目留给下一轮淘汰。
    pub async fn evict_until_under_budget(
        &self,
        in_flight: &HashSet<ContentKey>,
    ) -> Result<EvictionReport, CacheError> {
        let mut entries = self.scan().await?;
        let mut total: u64 = entries.iter().map(|e| e.size_bytes).sum();
        let mut report = EvictionReport::default();

        if total > self.max_bytes {
            entries.sort_by_key(|e| e.last_access);

            for ent in entries {
                if total <= self.max_bytes {
                    break;
                }
                if in_flight.contains(&ent.key) {
                    continue;
                }
                match tokio::fs::remove_file(&ent.path).await {
                    Ok(()) => {
                        tracing::info!(key = %ent.key, size = ent.size_bytes, "淘汰缓存文件");
                        total = total.saturating_sub(ent.size_bytes);
                        report.removed_files += 1;
                        report.removed_bytes += ent.size_bytes;
                    }
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        total = total.saturating_sub(ent.size_bytes);
                    }
                    Err(e) => {
                        tracing::warn!(path = %ent.path.display(), err = %e, "删除缓存文件失败");
                        report.failed += 1;
                    }
                }
            }
        }

        report.remaining_bytes = total;
        Ok(report)
    }

    /// 清空全部缓存条目（下载中的 key 保留）
    pub async fn clear_all(
        &self,
        in_flight: &HashSet<ContentKey>,
    ) -> Result<(usize, u64), CacheError> {
        let mut removed_files = 0usize;
        let mut removed_bytes = 0u64;
        for ent in self.scan().await? {
            if in_flight.contains(&ent.key) {
                continue;
            }
            match tokio::fs::remove_file(&ent.path).await {
                Ok(()) => {
                    removed_files += 1;
                    removed_bytes = removed_bytes.saturating_add(ent.size_bytes);
                }
                Err(e) => {
                    tracing::warn!(path = %ent.path.display(), err = %e, "删除缓存文件失败");
                }
            }
        }
        Ok((removed_files, removed_bytes))
    }

    fn entry_key(&self, path: &Path) -> Option<ContentKey> {
        let name = path.file_name()?.to_str()?;
        if name.contains(PART_MARKER) {
            return None;
        }
        let (stem, ext) = name.rsplit_once('.')?;
        if ext != self.ext {
            return None;
        }
        ContentKey::from_file_stem(stem)
    }

    /// 清理上次崩溃遗留的临时产物
    fn sweep_stale_temps(&self) -> usize {
        let Ok(rd) = fs::read_dir(&self.dir) else {
            return 0;
        };
        let mut removed = 0usize;
        for ent in rd.flatten() {
            let p = ent.path();
            let is_part = p
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.contains(PART_MARKER));
            if !is_part || p.is_dir() {
                continue;
            }
            match fs::remove_file(&p) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(path = %p.display(), err = %e, "删除遗留临时文件失败"),
            }
        }
        removed
    }
}

pub(crate) fn set_mtime(path: &Path, t: SystemTime) -> io::Result<()> {
    let f = fs::File::options().write(true).open(path)?;
    f.set_modified(t)
}
