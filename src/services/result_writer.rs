//! 结果写入服务 - 业务能力层
//!
//! 只负责"把能力记录追加到结果文件"能力，不关心流程

use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{AppResult, FileError};
use crate::models::AbilityRecord;

/// 结果写入服务
///
/// 职责：
/// - 将能力记录以 JSON Lines 形式追加写入
/// - 只处理单条记录
/// - 不关心记录如何计算
pub struct ResultWriter {
    output_path: PathBuf,
}

impl ResultWriter {
    /// 使用自定义文件路径创建
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: path.into(),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.output_path
    }

    /// 写入一条能力记录
    pub async fn write(&self, record: &AbilityRecord) -> AppResult<()> {
        debug!(
            "写入能力记录: {} | {} | {:.3}",
            record.subject, record.criterion, record.ability
        );

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let write_failed = |source| FileError::WriteFailed {
            path: self.output_path.display().to_string(),
            source,
        };

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.output_path)
            .await
            .map_err(write_failed)?;

        file.write_all(line.as_bytes()).await.map_err(write_failed)?;
        file.flush().await.map_err(write_failed)?;

        Ok(())
    }

    /// 依次写入多条记录
    pub async fn write_all(&self, records: &[AbilityRecord]) -> AppResult<()> {
        for record in records {
            self.write(record).await?;
        }
        Ok(())
    }
}
