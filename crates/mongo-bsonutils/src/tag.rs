//! 字段标签解析
//!
//! 标签格式 `"[<key>][,<flag1>[,<flag2>]...]"`,支持的标志为
//! `omitempty`、`minsize` 与 `inline`。整个标签为 `"-"` 时排除该字段。

use crate::ConfigErrorKind;

/// 解析后的字段标签
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldTag {
    /// 显式键,为空时使用小写字段名
    pub key: Option<String>,
    pub skip: bool,
    pub omit_empty: bool,
    pub min_size: bool,
    pub inline: bool,
}

/// 解析字段标签文本
///
/// # Brief
/// 拆分键与标志;空标志片段(如 `"name,"`)被忽略
///
/// # Arguments
/// * `tag` - 标签文本
///
/// # Returns
/// 未知标志返回 `ConfigErrorKind::UnsupportedFlag`
pub fn parse_tag(tag: &str) -> Result<FieldTag, ConfigErrorKind> {
    if tag == "-" {
        return Ok(FieldTag {
            skip: true,
            ..FieldTag::default()
        });
    }

    let mut parts = tag.split(',');
    let key = parts.next().unwrap_or_default();
    let mut parsed = FieldTag {
        key: (!key.is_empty()).then(|| key.to_string()),
        ..FieldTag::default()
    };

    for flag in parts {
        match flag {
            "" => {}
            "omitempty" => parsed.omit_empty = true,
            "minsize" => parsed.min_size = true,
            "inline" => parsed.inline = true,
            other => {
                return Err(ConfigErrorKind::UnsupportedFlag {
                    flag: other.to_string(),
                    tag: tag.to_string(),
                })
            }
        }
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_and_flags() {
        let tag = parse_tag("myf,omitempty,minsize").unwrap();
        assert_eq!(tag.key.as_deref(), Some("myf"));
        assert!(tag.omit_empty);
        assert!(tag.min_size);
        assert!(!tag.inline);
        assert!(!tag.skip);
    }

    #[test]
    fn test_flags_without_key() {
        let tag = parse_tag(",inline").unwrap();
        assert_eq!(tag.key, None);
        assert!(tag.inline);

        assert_eq!(parse_tag("").unwrap(), FieldTag::default());
    }

    #[test]
    fn test_skip() {
        assert!(parse_tag("-").unwrap().skip);
        // 仅当整个标签为 "-" 时排除
        let tag = parse_tag("-,omitempty").unwrap();
        assert!(!tag.skip);
        assert_eq!(tag.key.as_deref(), Some("-"));
    }

    #[test]
    fn test_empty_flag_ignored() {
        let tag = parse_tag("name,").unwrap();
        assert_eq!(tag.key.as_deref(), Some("name"));
        assert!(!tag.omit_empty);
    }

    #[test]
    fn test_unsupported_flag() {
        let err = parse_tag("name,omitempty,bogus").unwrap_err();
        assert_eq!(
            err,
            ConfigErrorKind::UnsupportedFlag {
                flag: "bogus".to_string(),
                tag: "name,omitempty,bogus".to_string(),
            }
        );
    }
}
