use crate::{DriveError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use md5::Md5;
use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// 秒传所需的全文件哈希与持有证明。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofCode {
    /// 全文件 SHA-1，大写十六进制。
    pub content_hash: String,
    pub proof_code: String,
}

/// 秒传校验器：根据 access token 与本地文件计算持有证明。
/// 对同一 (token, 文件) 必须给出确定的结果，并自行管理文件读取。
pub trait ProofProvider: Send + Sync {
    fn compute_proof(&self, access_token: &str, local_path: &Path) -> Result<ProofCode>;
}

/// proof_version=v1 的默认实现。
#[derive(Clone, Copy, Debug, Default)]
pub struct FileProofProvider;

const PROOF_BYTES: u64 = 8;

impl ProofProvider for FileProofProvider {
    fn compute_proof(&self, access_token: &str, local_path: &Path) -> Result<ProofCode> {
        let mut file = File::open(local_path)?;
        let size = file.metadata()?.len();

        let mut hasher = Sha1::new();
        io::copy(&mut file, &mut hasher)?;
        let content_hash = hex::encode_upper(hasher.finalize());

        let offset = proof_offset(access_token, size)?;
        let mut sample = Vec::with_capacity(PROOF_BYTES as usize);
        file.seek(SeekFrom::Start(offset))?;
        file.take(PROOF_BYTES.min(size - offset))
            .read_to_end(&mut sample)?;

        Ok(ProofCode {
            content_hash,
            proof_code: STANDARD.encode(sample),
        })
    }
}

/// 证明字节的起始偏移：md5(token) 前 16 位十六进制对文件大小取模。
pub(crate) fn proof_offset(access_token: &str, size: u64) -> Result<u64> {
    if size == 0 {
        return Ok(0);
    }
    let digest = hex::encode(Md5::digest(access_token.as_bytes()));
    let seed = u64::from_str_radix(&digest[..16], 16)
        .map_err(|e| DriveError::Decode(format!("invalid proof seed: {e}")))?;
    Ok(seed % size)
}

/// 文件前 1024 字节的 SHA-1，用于首轮去重探测。
pub(crate) fn pre_hash<R: Read>(reader: R) -> Result<String> {
    let mut head = Vec::with_capacity(PRE_HASH_BYTES as usize);
    reader.take(PRE_HASH_BYTES).read_to_end(&mut head)?;
    Ok(hex::encode(Sha1::digest(&head)))
}

pub(crate) const PRE_HASH_BYTES: u64 = 1024;
