//! # ストレージキー解決
//!
//! (データセット, チャンクパス) → オブジェクトキー の純粋関数。I/Oは行わない。
//!
//! チャンクパスの形状（`0.0`, `c/0/0`, `.zarray`, `zarr.json` 等）は
//! Zarrのバージョンごとに異なるため、ここでは解釈せずにそのまま連結する。
//! 行うのは `.`/`..` セグメントの正規化と、プレフィックス外への脱出の拒否のみ。
//! 途中や末尾の空セグメント (`a//0.0`, `0.0/`) は別オブジェクトを指すため、詰めずに拒否する。

use std::fmt;

use crate::dataset::Dataset;

/// チャンクパスの解決エラー。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// `..` によりデータセットのプレフィックス外を指している
    #[error("パスがデータセットの外を指しています")]
    Traversal,
    /// 正規化後のパスが空（プレフィックス自体はオブジェクトではない）
    #[error("パスが空です")]
    Empty,
    /// 途中または末尾に空セグメントを含む
    #[error("パスに空のセグメントが含まれています")]
    EmptySegment,
}

/// 完全修飾されたオブジェクトキー (`prefix + "/" + path`)。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    /// キー文字列を返す。
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// パスが指すオブジェクトの種別。キャッシュ方針の決定に使う。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// グループ・配列のメタデータ文書（再生成され得る）
    Metadata,
    /// チャンクblob（パスが変わらない限り内容も変わらない）
    Chunk,
}

/// Zarr v2/v3 の既知のメタデータ文書名
const METADATA_DOCUMENTS: &[&str] = &[".zarray", ".zgroup", ".zattrs", ".zmetadata", "zarr.json"];

impl PathKind {
    /// 最終セグメントからメタデータ文書かチャンクかを判定する。
    ///
    /// 既知の文書名に加え、ドットファイルと `*.json` はメタデータとして扱う。
    /// v2のチャンク名 (`0.0`) も v3のチャンク名 (`c/0/0`) もドットで始まらないため、
    /// バージョンを問わずチャンクと判定される。
    pub fn classify(path: &str) -> Self {
        let name = path.rsplit('/').next().unwrap_or(path);
        if METADATA_DOCUMENTS.contains(&name) || name.starts_with('.') || name.ends_with(".json") {
            PathKind::Metadata
        } else {
            PathKind::Chunk
        }
    }
}

/// チャンクパスを正規化する。
///
/// 先頭の `/` と `.` を除去し、`..` は直前のセグメントを打ち消す。
/// 打ち消すセグメントが無い `..` はプレフィックス外への脱出とみなす。
pub fn normalize(chunk_path: &str) -> Result<String, PathError> {
    if chunk_path.is_empty() {
        return Err(PathError::Empty);
    }
    let mut segments: Vec<&str> = Vec::new();
    for (i, segment) in chunk_path.split('/').enumerate() {
        match segment {
            "" if i == 0 => {}
            "" => return Err(PathError::EmptySegment),
            "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(PathError::Traversal);
                }
            }
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        return Err(PathError::Empty);
    }
    Ok(segments.join("/"))
}

/// データセットとチャンクパスからオブジェクトキーを解決する。
pub fn resolve(dataset: &Dataset, chunk_path: &str) -> Result<StorageKey, PathError> {
    let relative = normalize(chunk_path)?;
    Ok(StorageKey(format!("{}/{relative}", dataset.prefix())))
}
