use chrono::{DateTime, Local, Utc};
use uuid::Uuid;

/// 当前 Unix 时间戳（秒）
pub fn current_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// 生成一个随机唯一 ID
pub fn generate_uuid() -> [u8; 16] {
    Uuid::new_v4().into_bytes()
}

/// 把时间戳格式化成本地时间
pub fn format_timestamp(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}
