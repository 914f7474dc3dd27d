use crate::error::FileError;
use crate::models::assessment::Assessment;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// 从 TOML 文件加载数据并转换为 Assessment 对象
pub async fn load_toml_to_assessment(toml_file_path: &Path) -> Result<Assessment> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let mut assessment: Assessment = toml::from_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    // 设置文件路径
    assessment.file_path = Some(toml_file_path.to_string_lossy().to_string());

    Ok(assessment)
}

/// 从文件夹中加载所有 TOML 文件，单个文件加载失败只记录警告
///
/// 返回结果按文件名排序，保证每次运行的处理顺序一致。
pub async fn load_all_toml_files(folder_path: &str) -> Result<Vec<Assessment>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        return Err(FileError::DirectoryNotFound {
            path: folder_path.to_string(),
        }
        .into());
    }

    let mut toml_files = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml_files.push(path);
        }
    }
    toml_files.sort();

    let mut assessments = Vec::new();
    for path in toml_files {
        tracing::info!(
            "正在加载: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );

        match load_toml_to_assessment(&path).await {
            Ok(assessment) => {
                tracing::info!(
                    "成功加载 {}: {} 个评估标准, {} 个条目",
                    assessment.subject,
                    assessment.criteria.len(),
                    assessment.items.len()
                );
                assessments.push(assessment);
            }
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {:#}", path.display(), e);
            }
        }
    }

    Ok(assessments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_folder_is_directory_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");

        let err = load_all_toml_files(&missing.to_string_lossy())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FileError>(),
            Some(FileError::DirectoryNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_all_skips_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("b.toml"),
            "subject = \"bob\"\n[[criteria]]\nid = \"c\"\ndescription = \"d\"\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("a.toml"), "subject = \"alice\"\n").unwrap();
        std::fs::write(dir.path().join("broken.toml"), "subject = [").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let loaded = load_all_toml_files(dir.path().to_str().unwrap()).await.unwrap();
        let subjects: Vec<&str> = loaded.iter().map(|a| a.subject.as_str()).collect();
        assert_eq!(subjects, vec!["alice", "bob"]);
        assert!(loaded[0].file_path.as_deref().unwrap().ends_with("a.toml"));
    }

    #[tokio::test]
    async fn test_missing_folder_is_error() {
        assert!(load_all_toml_files("/definitely/not/here").await.is_err());
    }
}
