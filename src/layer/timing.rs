//! 计时包装：对任意层的 process 统一加上 start_time / end_time / processing_duration
//!
//! 成功时：结果序列化为对象则把三个字段合并进去，否则包装成
//! `{result, start_time, end_time, processing_duration}`。
//! 失败时：记录层名与原因，转为携带原始原因的 LayerProcessingError。

use std::future::Future;
use std::time::Instant;

use serde::ser::Error as _;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::layer::{LayerProcessingError, StageProcessingError};

/// 当前 Unix 时间（秒，含小数）
pub fn unix_now() -> f64 {
    let now = chrono::Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1_000_000.0
}

/// 一次调用的时间戳（秒）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    pub start_time: f64,
    pub end_time: f64,
    pub processing_duration: f64,
}

impl Timing {
    /// end_time 由单调时钟的耗时推出，保证 end_time >= start_time
    fn measure(start_time: f64, started: Instant) -> Self {
        let end_time = start_time + started.elapsed().as_secs_f64();
        Self {
            start_time,
            end_time,
            processing_duration: end_time - start_time,
        }
    }
}

/// 带计时信息的结果
#[derive(Debug, Clone, PartialEq)]
pub struct Timed<T> {
    pub value: T,
    pub timing: Timing,
}

impl<T: Serialize> Serialize for Timed<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let value = serde_json::to_value(&self.value).map_err(S::Error::custom)?;
        let mut map = match value {
            Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("result".to_string(), other);
                map
            }
        };
        map.insert("start_time".to_string(), self.timing.start_time.into());
        map.insert("end_time".to_string(), self.timing.end_time.into());
        map.insert(
            "processing_duration".to_string(),
            self.timing.processing_duration.into(),
        );
        map.serialize(serializer)
    }
}

/// 计时并统一错误类型
pub async fn timed_process<T, F>(layer: &str, process: F) -> Result<Timed<T>, LayerProcessingError>
where
    F: Future<Output = Result<T, StageProcessingError>>,
{
    let start_time = unix_now();
    let started = Instant::now();

    match process.await {
        Ok(value) => Ok(Timed {
            value,
            timing: Timing::measure(start_time, started),
        }),
        Err(source) => {
            tracing::error!(layer, error = %source, "Layer processing failed");
            Err(LayerProcessingError {
                layer: layer.to_string(),
                source,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use serde_json::json;

    #[tokio::test]
    async fn test_merges_timing_into_mapping() {
        let timed = timed_process("reactive", async { Ok(json!({"type": "t", "content": "c"})) })
            .await
            .unwrap();

        assert!(timed.timing.end_time >= timed.timing.start_time);
        assert_eq!(
            timed.timing.processing_duration,
            timed.timing.end_time - timed.timing.start_time
        );

        let value = serde_json::to_value(&timed).unwrap();
        assert_eq!(value["type"], "t");
        assert!(value.get("result").is_none());
        assert_eq!(value["start_time"], timed.timing.start_time);
        assert_eq!(value["processing_duration"], timed.timing.processing_duration);
    }

    #[tokio::test]
    async fn test_wraps_bare_value() {
        let timed = timed_process("custom", async { Ok::<_, StageProcessingError>("plain") })
            .await
            .unwrap();

        let value = serde_json::to_value(&timed).unwrap();
        assert_eq!(value["result"], "plain");
        assert!(value.get("end_time").is_some());
    }

    #[tokio::test]
    async fn test_measures_elapsed_time() {
        let timed = timed_process("slow", async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok::<_, StageProcessingError>(1)
        })
        .await
        .unwrap();
        assert!(timed.timing.processing_duration >= 0.02);
    }

    #[tokio::test]
    async fn test_retags_failure_with_cause() {
        let err = timed_process::<(), _>("reflective", async {
            Err(StageProcessingError::Inference(LlmError::Backend("boom".into())))
        })
        .await
        .unwrap_err();

        assert_eq!(err.layer, "reflective");
        assert_eq!(
            err.source,
            StageProcessingError::Inference(LlmError::Backend("boom".into()))
        );
        assert_eq!(
            err.to_string(),
            "Layer processing failed: inference failed: Backend error: boom"
        );
    }
}
