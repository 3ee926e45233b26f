//! 事件名与订阅模式
//!
//! 事件名由 `/` 分隔的段组成（如 `h/lotgd/core/cli/character-config-list`）。
//! 订阅模式使用相同的语法，其中值为 `*` 的段是通配符：
//!
//! - 末尾的 `*` 匹配一个或多个剩余段
//! - 中间的 `*` 恰好匹配一个段
//! - 其余段必须逐字相等；不以 `*` 结尾的模式要求段数一致

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

use crate::utils::{CoreError, Result};

/// 通配符段
pub const WILDCARD: &str = "*";

/// 单个段的格式
static SEGMENT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("Invalid segment regex"));

/// 检查事件名格式是否有效（不允许通配符）
///
/// # Example
///
/// ```
/// use lotgd_core::event::pattern::is_valid_event_name;
///
/// assert!(is_valid_event_name("h/lotgd/core/cli/foo"));
/// assert!(!is_valid_event_name("h/lotgd/*"));
/// assert!(!is_valid_event_name("h//core"));
/// ```
pub fn is_valid_event_name(event: &str) -> bool {
    !event.is_empty() && event.split('/').all(|s| SEGMENT_REGEX.is_match(s))
}

/// 校验事件名，失败时返回 `InvalidEventName`
pub fn validate_event_name(event: &str) -> Result<()> {
    if is_valid_event_name(event) {
        Ok(())
    } else {
        Err(CoreError::InvalidEventName(event.to_string()))
    }
}

/// 模式中的一个段
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Wildcard,
}

/// 已解析的订阅模式
///
/// 模式一经注册不再修改。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl EventPattern {
    /// 解析订阅模式
    ///
    /// # Errors
    ///
    /// 模式为空、含空段或段内含非法字符时返回 `InvalidPattern`
    pub fn parse(pattern: &str) -> Result<Self> {
        let invalid = |reason: &str| CoreError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        if pattern.is_empty() {
            return Err(invalid("模式不能为空"));
        }

        let mut segments = Vec::new();
        for (index, segment) in pattern.split('/').enumerate() {
            if segment.is_empty() {
                return Err(invalid(&format!("第 {} 段为空", index + 1)));
            }
            if segment == WILDCARD {
                segments.push(Segment::Wildcard);
            } else if SEGMENT_REGEX.is_match(segment) {
                segments.push(Segment::Literal(segment.to_string()));
            } else {
                return Err(invalid(&format!("第 {} 段 '{}' 含非法字符", index + 1, segment)));
            }
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    /// 原始模式字符串
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// 是否以通配符结尾
    pub fn is_trailing_wildcard(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::Wildcard))
    }

    /// 是否不含任何通配符
    pub fn is_exact(&self) -> bool {
        self.segments.iter().all(|s| matches!(s, Segment::Literal(_)))
    }

    /// 检查事件名是否匹配此模式
    ///
    /// # Example
    ///
    /// ```
    /// use lotgd_core::event::EventPattern;
    ///
    /// let pattern = EventPattern::parse("h/lotgd/core/*").unwrap();
    /// assert!(pattern.matches("h/lotgd/core/bar"));
    /// assert!(pattern.matches("h/lotgd/core/cli/foo"));
    /// assert!(!pattern.matches("h/lotgd/core"));
    /// ```
    pub fn matches(&self, event: &str) -> bool {
        let event_segments: Vec<&str> = event.split('/').collect();

        let (head, tail_wildcard) = if self.is_trailing_wildcard() {
            (&self.segments[..self.segments.len() - 1], true)
        } else {
            (&self.segments[..], false)
        };

        if tail_wildcard {
            // 末尾通配符至少吞掉一个段
            if event_segments.len() <= head.len() {
                return false;
            }
        } else if event_segments.len() != head.len() {
            return false;
        }

        head.iter()
            .zip(event_segments.iter())
            .all(|(segment, actual)| match segment {
                Segment::Wildcard => !actual.is_empty(),
                Segment::Literal(expected) => expected == actual,
            })
    }
}

impl fmt::Display for EventPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for EventPattern {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(p: &str) -> EventPattern {
        EventPattern::parse(p).unwrap()
    }

    #[test]
    fn test_exact_pattern() {
        let p = pattern("h/lotgd/core/cli");
        assert!(p.is_exact());
        assert!(p.matches("h/lotgd/core/cli"));
        assert!(!p.matches("h/lotgd/core/cli/foo"));
        assert!(!p.matches("h/lotgd/core"));
    }

    #[test]
    fn test_trailing_wildcard() {
        let p = pattern("h/lotgd/core/*");
        assert!(p.is_trailing_wildcard());
        assert!(p.matches("h/lotgd/core/cli/foo"));
        assert!(p.matches("h/lotgd/core/bar"));
        assert!(!p.matches("h/lotgd/core"));
        assert!(!p.matches("h/lotgd/other/bar"));
    }

    #[test]
    fn test_embedded_wildcard() {
        let p = pattern("h/*/core/navigate");
        assert!(p.matches("h/lotgd/core/navigate"));
        assert!(p.matches("h/vendor/core/navigate"));
        assert!(!p.matches("h/a/b/core/navigate"));
        assert!(!p.matches("h/lotgd/core/navigate/extra"));
    }

    #[test]
    fn test_lone_wildcard_matches_everything() {
        let p = pattern("*");
        assert!(p.matches("h"));
        assert!(p.matches("h/lotgd/core/anything"));
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(EventPattern::parse("").is_err());
        assert!(EventPattern::parse("h//core").is_err());
        assert!(EventPattern::parse("h/lotgd/co re").is_err());
        assert!(EventPattern::parse("h/lotgd/core*").is_err());
        assert!(matches!(
            EventPattern::parse("h/").unwrap_err(),
            CoreError::InvalidPattern { .. }
        ));
    }

    #[test]
    fn test_event_name_validation() {
        assert!(validate_event_name("h/lotgd/core/cli/character-config-list").is_ok());
        assert!(validate_event_name("").is_err());
        assert!(validate_event_name("h/lotgd/*").is_err());
        assert!(validate_event_name("/h/lotgd").is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        let p: EventPattern = "h/lotgd/core/*".parse().unwrap();
        assert_eq!(p.to_string(), "h/lotgd/core/*");
        assert_eq!(p.as_str(), "h/lotgd/core/*");
    }
}
