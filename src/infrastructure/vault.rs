//! 凭据保险库接口
//!
//! 加密算法由外部提供，这里只把它当作不透明的字符串变换

use crate::error::AppResult;

/// 凭据保险库
pub trait CredentialVault: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> AppResult<String>;
    fn decrypt(&self, ciphertext: &str) -> AppResult<String>;
}

/// 不做任何变换的保险库（本地开发与测试使用）
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughVault;

impl CredentialVault for PassthroughVault {
    fn encrypt(&self, plaintext: &str) -> AppResult<String> {
        Ok(plaintext.to_string())
    }

    fn decrypt(&self, ciphertext: &str) -> AppResult<String> {
        Ok(ciphertext.to_string())
    }
}
