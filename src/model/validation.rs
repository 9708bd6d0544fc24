use serde::Deserialize;
use serde_json::Value;

use crate::core::{MAX_KG, MIN_KG};
use crate::error::ValidationError;
use crate::math::{clamp, round2};

/// /submit 的原始请求体，字段类型宽松，交给 `validate` 判定
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitBody {
    #[serde(rename = "itemID", default)]
    pub item_id: Option<Value>,
    #[serde(rename = "guessKg", default)]
    pub guess_kg: Option<Value>,
}

impl SubmitBody {
    pub fn new(item_id: impl Into<String>, guess_kg: f64) -> Self {
        Self {
            item_id: Some(Value::String(item_id.into())),
            guess_kg: serde_json::Number::from_f64(guess_kg).map(Value::Number),
        }
    }

    pub fn from_slice(raw: &[u8]) -> Result<Self, ValidationError> {
        let value: Value = serde_json::from_slice(raw)
            .map_err(|e| ValidationError::MalformedBody(e.to_string()))?;
        if !value.is_object() {
            return Err(ValidationError::MalformedBody("expected a JSON object".into()));
        }
        serde_json::from_value(value).map_err(|e| ValidationError::MalformedBody(e.to_string()))
    }
}

/// 通过校验、可以写库的猜测
#[derive(Debug, Clone, PartialEq)]
pub struct ValidGuess {
    pub item_id: String,
    /// 已夹到 [MIN_KG, MAX_KG] 并保留两位小数
    pub value_kg: f64,
}

/// [写前检查] 任何一项不通过都不允许触碰存储
pub fn validate(body: &SubmitBody) -> Result<ValidGuess, ValidationError> {
    // 1. itemID：字符串或数字，trim 后非空
    let item_id = match &body.item_id {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    if item_id.is_empty() {
        return Err(ValidationError::EmptyItemId);
    }

    // 2. guessKg：数字或数字字符串，必须是有限值
    let raw = match &body.guess_kg {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    let raw = match raw {
        Some(v) if v.is_finite() => v,
        _ => return Err(ValidationError::NonFiniteGuess),
    };

    // 3. 越界夹紧而不是拒绝
    Ok(ValidGuess {
        item_id,
        value_kg: normalize_kg(raw),
    })
}

pub fn normalize_kg(raw: f64) -> f64 {
    round2(clamp(raw, MIN_KG, MAX_KG))
}
