//! JSON file store
//!
//! Every operation reads the snapshot from disk, so several processes (the
//! daemon and `recctl`) can share one file. A mutation holds an exclusive
//! advisory lock on `<snapshot>.lock` from load to save, and the new
//! snapshot is written to a unique temp file in the same directory before
//! it replaces the old one. Readers take no lock.

use super::data::StoreData;
use super::{Store, StoreError};
use crate::models::{Application, ApplicationResource, ContainerResource, NewTimeframe, Timeframe};
use async_trait::async_trait;
use chrono::Utc;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling file used for the cross-process writer lock
    pub fn lock_path(&self) -> PathBuf {
        match self.path.file_name() {
            Some(name) => {
                let mut name = name.to_os_string();
                name.push(".lock");
                self.path.with_file_name(name)
            }
            None => self.path.with_extension("lock"),
        }
    }

    fn dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    async fn load(&self) -> Result<StoreData, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(StoreData::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreData::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Block (off the runtime) until this process owns the writer lock.
    /// The lock is released when the returned file is dropped.
    async fn lock_exclusive(&self) -> Result<File, StoreError> {
        tokio::fs::create_dir_all(self.dir()).await?;
        let lock_path = self.lock_path();
        let file = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&lock_path)?;
            FileExt::lock_exclusive(&file)?;
            Ok(file)
        })
        .await
        .map_err(blocking_task_failed)??;
        Ok(file)
    }

    async fn save(&self, data: &StoreData) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(data)?;
        let bytes = json.len();
        let dir = self.dir();
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut temp = NamedTempFile::new_in(&dir)?;
            temp.write_all(&json)?;
            temp.as_file().sync_all()?;
            temp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(blocking_task_failed)??;

        debug!(path = %self.path.display(), bytes, "Saved store snapshot");
        Ok(())
    }

    async fn read<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&StoreData) -> Result<T, StoreError>,
    {
        let data = self.load().await?;
        f(&data)
    }

    async fn mutate<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut StoreData) -> Result<T, StoreError>,
    {
        let _guard = self.write_lock.lock().await;
        let lock = self.lock_exclusive().await?;
        let mut data = self.load().await?;
        let result = f(&mut data)?;
        self.save(&data).await?;
        drop(lock);
        Ok(result)
    }
}

fn blocking_task_failed(e: tokio::task::JoinError) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, e)
}

#[async_trait]
impl Store for FileStore {
    async fn list_applications(&self) -> Result<Vec<Application>, StoreError> {
        self.read(|data| Ok(data.list_applications())).await
    }

    async fn get_application(&self, name: &str) -> Result<Application, StoreError> {
        self.read(|data| data.get_application(name)).await
    }

    async fn create_application(&self, name: &str) -> Result<Application, StoreError> {
        self.mutate(|data| data.create_application(name, Utc::now()))
            .await
    }

    async fn update_application(
        &self,
        name: &str,
        new_name: &str,
    ) -> Result<Application, StoreError> {
        self.mutate(|data| data.update_application(name, new_name, Utc::now()))
            .await
    }

    async fn delete_application(&self, name: &str) -> Result<(), StoreError> {
        self.mutate(|data| data.delete_application(name)).await
    }

    async fn list_timeframes(&self) -> Result<Vec<Timeframe>, StoreError> {
        self.read(|data| Ok(data.list_timeframes())).await
    }

    async fn get_timeframe(&self, name: &str) -> Result<Timeframe, StoreError> {
        self.read(|data| data.get_timeframe(name)).await
    }

    async fn create_timeframe(&self, timeframe: NewTimeframe) -> Result<Timeframe, StoreError> {
        self.mutate(|data| data.create_timeframe(timeframe, Utc::now()))
            .await
    }

    async fn update_timeframe(&self, timeframe: Timeframe) -> Result<Timeframe, StoreError> {
        self.mutate(|data| data.update_timeframe(timeframe, Utc::now()))
            .await
    }

    async fn update_timeframes(
        &self,
        timeframes: Vec<Timeframe>,
    ) -> Result<Vec<Timeframe>, StoreError> {
        self.mutate(|data| data.update_timeframes(timeframes, Utc::now()))
            .await
    }

    async fn delete_timeframe(&self, name: &str) -> Result<(), StoreError> {
        self.mutate(|data| data.delete_timeframe(name)).await
    }

    async fn get_application_resource(
        &self,
        application: &str,
    ) -> Result<ApplicationResource, StoreError> {
        self.read(|data| data.get_application_resource(application))
            .await
    }

    async fn list_application_resources(&self) -> Result<Vec<ApplicationResource>, StoreError> {
        self.read(|data| Ok(data.list_application_resources())).await
    }

    async fn get_timeframe_application_resource(
        &self,
        timeframe: &str,
        application: &str,
    ) -> Result<ApplicationResource, StoreError> {
        self.read(|data| data.get_timeframe_application_resource(timeframe, application))
            .await
    }

    async fn list_timeframe_application_resources(
        &self,
        timeframe: &str,
    ) -> Result<Vec<ApplicationResource>, StoreError> {
        self.read(|data| data.list_timeframe_application_resources(timeframe))
            .await
    }

    async fn add_or_update_container_resources(
        &self,
        resources: Vec<ContainerResource>,
    ) -> Result<Vec<ContainerResource>, StoreError> {
        self.mutate(|data| data.add_or_update_container_resources(resources, Utc::now()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimeframeStatus;
    use chrono::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_reads_as_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path().join("store.json"));

        assert!(store.list_applications().await.unwrap().is_empty());
        assert!(store.list_timeframes().await.unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_rows_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("store.json");
        let now = Utc::now();

        {
            let store = FileStore::new(&path);
            store.create_application("svc-a").await.unwrap();
            store
                .create_timeframe(
                    NewTimeframe::new("tf1", now - Duration::hours(2), now - Duration::hours(1))
                        .with_status(TimeframeStatus::On),
                )
                .await
                .unwrap();
        }

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get_application("svc-a").await.unwrap().name, "svc-a");
        assert!(reopened.get_timeframe("tf1").await.unwrap().status.is_on());

        let mut leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        leftovers.sort();
        assert_eq!(leftovers, vec!["store.json", "store.json.lock"]);
    }

    #[tokio::test]
    async fn test_failed_mutation_leaves_file_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.json");
        let store = FileStore::new(&path);
        store.create_application("svc-a").await.unwrap();
        let before = std::fs::read(&path).unwrap();

        assert!(matches!(
            store.create_application("svc-a").await,
            Err(StoreError::AlreadyExists { .. })
        ));

        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.json");
        std::fs::write(&path, b"{not json").unwrap();

        let store = FileStore::new(&path);
        assert!(matches!(
            store.list_applications().await,
            Err(StoreError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_writers_do_not_lose_rows() {
        let temp_dir = TempDir::new().unwrap();
        let store = std::sync::Arc::new(FileStore::new(temp_dir.path().join("store.json")));

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = std::sync::Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.create_application(&format!("svc-{}", i)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.list_applications().await.unwrap().len(), 8);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_two_handles_on_one_file_do_not_lose_rows() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.json");
        let first = std::sync::Arc::new(FileStore::new(&path));
        let second = std::sync::Arc::new(FileStore::new(&path));

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = if i % 2 == 0 {
                std::sync::Arc::clone(&first)
            } else {
                std::sync::Arc::clone(&second)
            };
            handles.push(tokio::spawn(async move {
                store.create_application(&format!("svc-{}", i)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(first.list_applications().await.unwrap().len(), 20);
        assert_eq!(second.list_applications().await.unwrap().len(), 20);

        let entries = std::fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(entries, 2, "only the snapshot and its lock file remain");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_writer_waits_for_lock_held_elsewhere() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.json");
        let store = std::sync::Arc::new(FileStore::new(&path));

        let held = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(store.lock_path())
            .unwrap();
        FileExt::lock_exclusive(&held).unwrap();

        let writer = {
            let store = std::sync::Arc::clone(&store);
            tokio::spawn(async move { store.create_application("svc-a").await })
        };

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert!(!writer.is_finished());
        assert!(!path.exists());

        FileExt::unlock(&held).unwrap();
        writer.await.unwrap().unwrap();
        assert_eq!(store.list_applications().await.unwrap().len(), 1);
    }
}
