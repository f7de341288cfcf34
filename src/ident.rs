//! 上传文件标识符生成。

use std::fmt::Debug;
use uuid::Uuid;

pub const ID_LEN: usize = 8;

/// 标识符来源；上传流程只依赖此 trait。
pub trait IdSource: Send + Sync + Debug {
    fn next_id(&self) -> String;
}

/// 基于随机 UUIDv4 的默认实现。
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdSource for RandomIds {
    fn next_id(&self) -> String {
        new_id()
    }
}

/// 生成 8 位小写十六进制标识符。
///
/// 取无连字符 UUID 的前 8 位，避开固定的版本位（下标 12）。
pub fn new_id() -> String {
    let mut buf = Uuid::encode_buffer();
    let simple = Uuid::new_v4().simple().encode_lower(&mut buf);
    simple[..ID_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_fixed_width_hex() {
        for _ in 0..64 {
            let id = new_id();
            assert_eq!(id.len(), ID_LEN);
            assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn ids_rarely_collide() {
        let ids: HashSet<String> = (0..256).map(|_| RandomIds.next_id()).collect();
        assert_eq!(ids.len(), 256);
    }
}
