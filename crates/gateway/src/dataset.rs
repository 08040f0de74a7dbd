//! # データセット定義
//!
//! ストレージ上のZarr配列コレクションと、その名前引きレジストリ。
//! 起動時に設定から構築され、プロセス終了まで変更されない。

use std::collections::BTreeMap;

use zarr_gateway_types::DatasetInfo;

/// 名前付きのZarr配列コレクション。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    name: String,
    /// 先頭・末尾の `/` を除いたストレージプレフィックス
    prefix: String,
    shape: Vec<u64>,
    dtype: String,
    chunks: Vec<u64>,
}

impl Dataset {
    /// データセットを構築する。
    ///
    /// プレフィックスは前後の `/` を除去した上で検証する。
    /// 空のプレフィックスや `.`/`..` セグメントを含むプレフィックスは拒否する。
    pub fn new(
        name: &str,
        prefix: &str,
        shape: Vec<u64>,
        dtype: &str,
        chunks: Vec<u64>,
    ) -> Result<Self, String> {
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            return Err("プレフィックスが空です".to_string());
        }
        if prefix
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(format!("プレフィックスに不正なセグメントが含まれています: {prefix}"));
        }
        if shape.len() != chunks.len() {
            return Err(format!(
                "shapeとchunksの次元数が一致しません: {} != {}",
                shape.len(),
                chunks.len()
            ));
        }

        Ok(Self {
            name: name.to_string(),
            prefix: prefix.to_string(),
            shape,
            dtype: dtype.to_string(),
            chunks,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// 公開情報（プレフィックスを含まない）を返す。
    pub fn info(&self) -> DatasetInfo {
        DatasetInfo {
            name: self.name.clone(),
            shape: self.shape.clone(),
            dtype: self.dtype.clone(),
            chunks: self.chunks.clone(),
        }
    }
}

/// データセット名 → Dataset のレジストリ。
#[derive(Debug, Clone, Default)]
pub struct DatasetRegistry {
    datasets: BTreeMap<String, Dataset>,
}

impl DatasetRegistry {
    pub fn new(datasets: impl IntoIterator<Item = Dataset>) -> Self {
        Self {
            datasets: datasets
                .into_iter()
                .map(|d| (d.name.clone(), d))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Dataset> {
        self.datasets.get(name)
    }

    /// 名前順にデータセットを返す。
    pub fn iter(&self) -> impl Iterator<Item = &Dataset> {
        self.datasets.values()
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }
}
