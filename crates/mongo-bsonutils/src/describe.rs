//! 类型描述缓存模块
//!
//! 派生宏为每个结构体生成原始字段表(字段名、标签文本、inline 能力),
//! 本模块在首次编解码时把它解析为 `TypeDescriptor`:有序字段列表、
//! 键索引以及 catch-all inline 映射的位置。描述符按 `TypeId` 缓存,
//! 在进程生命周期内不失效。
//!
//! inline 结构体的字段以索引路径表示,路径的每一段都是外层字段的下标。

use crate::de::{Decode, DecodeMap};
use crate::ser::{Encode, EncodeMap};
use crate::tag::parse_tag;
use crate::value::Value;
use crate::{BsonError, BsonResult, ConfigErrorKind};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use smallvec::{smallvec, SmallVec};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// 字段索引路径
pub type FieldPath = SmallVec<[usize; 4]>;

/// 可派生的结构体
///
/// 由 `#[derive(BsonStruct)]` 实现。`field`/`field_mut` 按原始字段下标访问字段,
/// 被 `"-"` 排除的字段返回 `None`。
pub trait BsonStruct: Encode + Decode + 'static {
    fn struct_type() -> StructType
    where
        Self: Sized;

    fn descriptor(&self) -> BsonResult<Arc<TypeDescriptor>>;

    fn field(&self, index: usize) -> Option<&dyn Encode>;

    fn field_mut(&mut self, index: usize) -> Option<&mut dyn Decode>;

    /// 重置为零值
    fn reset(&mut self);
}

/// 结构体的静态信息
#[derive(Debug, Clone, Copy)]
pub struct StructType {
    pub type_id: fn() -> TypeId,
    pub type_name: &'static str,
    pub fields: fn() -> Vec<RawField>,
}

/// 派生宏生成的原始字段
#[derive(Debug, Clone, Copy)]
pub struct RawField {
    pub name: &'static str,
    pub tag: Option<&'static str>,
    pub inline: InlineKind,
}

impl RawField {
    pub fn new(name: &'static str, tag: Option<&'static str>, inline: InlineKind) -> Self {
        Self { name, tag, inline }
    }
}

/// 字段类型的 inline 能力
#[derive(Debug, Clone, Copy)]
pub enum InlineKind {
    None,
    Struct(StructType),
    Map,
}

/// 编码时 inline 字段的视图
pub enum InlineRef<'a> {
    Struct(&'a dyn BsonStruct),
    Map(&'a dyn EncodeMap),
}

/// 解码时 inline 字段的视图
pub enum InlineMut<'a> {
    Struct(&'a mut dyn BsonStruct),
    Map(&'a mut dyn DecodeMap),
}

/// 已解析的字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// 输出键
    pub key: String,
    /// Rust 字段名
    pub name: &'static str,
    pub path: FieldPath,
    pub omit_empty: bool,
    pub min_size: bool,
}

/// 类型描述符,构造后不可变
#[derive(Debug)]
pub struct TypeDescriptor {
    type_name: &'static str,
    fields_ordered: Vec<FieldDescriptor>,
    fields_by_key: HashMap<String, usize>,
    inline_map: Option<FieldPath>,
}

impl TypeDescriptor {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 声明顺序(展开 inline 之后)的字段
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields_ordered
    }

    pub fn field_by_key(&self, key: &str) -> Option<&FieldDescriptor> {
        self.fields_by_key.get(key).map(|&i| &self.fields_ordered[i])
    }

    pub fn inline_map(&self) -> Option<&[usize]> {
        self.inline_map.as_deref()
    }

    fn push_field(&mut self, field: FieldDescriptor, owner: &'static str) -> BsonResult<()> {
        if self.fields_by_key.contains_key(&field.key) {
            return Err(BsonError::Configuration {
                type_name: self.type_name,
                field: owner,
                kind: ConfigErrorKind::DuplicateKey { key: field.key },
            });
        }
        self.fields_by_key.insert(field.key.clone(), self.fields_ordered.len());
        self.fields_ordered.push(field);
        Ok(())
    }
}

static DESCRIPTORS: Lazy<DashMap<TypeId, Arc<TypeDescriptor>>> = Lazy::new(DashMap::new);

/// 获取类型描述符
///
/// # Brief
/// 缓存命中直接返回;未命中时在锁外构造后写入,并发构造时后写者覆盖
///
/// # Arguments
/// * `ty` - 派生宏生成的结构体信息
///
/// # Returns
/// 标签或 inline 配置错误时返回 `BsonError::Configuration`
pub fn describe(ty: &StructType) -> BsonResult<Arc<TypeDescriptor>> {
    describe_nested(ty, &mut Vec::new())
}

fn describe_nested(ty: &StructType, stack: &mut Vec<TypeId>) -> BsonResult<Arc<TypeDescriptor>> {
    let id = (ty.type_id)();
    if let Some(found) = DESCRIPTORS.get(&id) {
        return Ok(Arc::clone(found.value()));
    }

    stack.push(id);
    let built = build(ty, stack);
    stack.pop();

    let descriptor = Arc::new(built?);
    debug!(
        type_name = ty.type_name,
        fields = descriptor.fields_ordered.len(),
        inline_map = descriptor.inline_map.is_some(),
        "built type descriptor"
    );
    if DESCRIPTORS.insert(id, Arc::clone(&descriptor)).is_some() {
        trace!(type_name = ty.type_name, "descriptor computed concurrently, replaced");
    }
    Ok(descriptor)
}

fn build(ty: &StructType, stack: &mut Vec<TypeId>) -> BsonResult<TypeDescriptor> {
    let raw = (ty.fields)();
    let mut descriptor = TypeDescriptor {
        type_name: ty.type_name,
        fields_ordered: Vec::with_capacity(raw.len()),
        fields_by_key: HashMap::with_capacity(raw.len()),
        inline_map: None,
    };

    for (index, field) in raw.iter().enumerate() {
        let config_error = |kind| BsonError::Configuration {
            type_name: ty.type_name,
            field: field.name,
            kind,
        };
        let tag = parse_tag(field.tag.unwrap_or_default()).map_err(config_error)?;
        if tag.skip {
            continue;
        }

        if !tag.inline {
            descriptor.push_field(
                FieldDescriptor {
                    key: tag.key.unwrap_or_else(|| field.name.to_lowercase()),
                    name: field.name,
                    path: smallvec![index],
                    omit_empty: tag.omit_empty,
                    min_size: tag.min_size,
                },
                field.name,
            )?;
            continue;
        }

        match field.inline {
            InlineKind::Map => {
                if descriptor.inline_map.is_some() {
                    return Err(config_error(ConfigErrorKind::MultipleInlineMaps));
                }
                descriptor.inline_map = Some(smallvec![index]);
            }
            InlineKind::Struct(nested) => {
                if stack.contains(&(nested.type_id)()) {
                    return Err(config_error(ConfigErrorKind::RecursiveInline));
                }
                let inner = describe_nested(&nested, stack)?;
                if let Some(path) = &inner.inline_map {
                    if descriptor.inline_map.is_some() {
                        return Err(config_error(ConfigErrorKind::MultipleInlineMaps));
                    }
                    descriptor.inline_map = Some(prefixed(index, path));
                }
                for nested_field in &inner.fields_ordered {
                    let mut spliced = nested_field.clone();
                    spliced.path = prefixed(index, &nested_field.path);
                    descriptor.push_field(spliced, field.name)?;
                }
            }
            InlineKind::None => return Err(config_error(ConfigErrorKind::InlineNotSupported)),
        }
    }

    Ok(descriptor)
}

fn prefixed(head: usize, rest: &[usize]) -> FieldPath {
    let mut path = FieldPath::with_capacity(rest.len() + 1);
    path.push(head);
    path.extend_from_slice(rest);
    path
}

/// 按索引路径读取字段;路径经过 `None` 指针时返回 `None`
pub fn field_at<'a>(value: &'a dyn BsonStruct, path: &[usize]) -> Option<&'a dyn Encode> {
    let (last, prefix) = path.split_last()?;
    let mut current = value;
    for &index in prefix {
        current = match current.field(index)?.as_inline()? {
            InlineRef::Struct(inner) => inner,
            InlineRef::Map(_) => return None,
        };
    }
    current.field(*last)
}

/// 沿索引路径把 `apply` 作用到目标字段
///
/// # Brief
/// 路径经过 `None` 指针时先在临时值上解码,`apply` 成功后才分配;
/// `value` 为 null 时保持 `None`
///
/// # Arguments
/// * `target` - 外层结构体
/// * `path` - 字段索引路径
/// * `value` - 待写入的元素值
/// * `apply` - 作用在路径末端字段上的写入操作
///
/// # Returns
/// `apply` 的结果;路径不可达时返回 `Ok(false)`
pub fn decode_at_path(
    target: &mut dyn BsonStruct,
    path: &[usize],
    value: &Value,
    apply: &mut dyn FnMut(&mut dyn Decode) -> BsonResult<bool>,
) -> BsonResult<bool> {
    let Some((&head, rest)) = path.split_first() else {
        return Ok(false);
    };
    let Some(slot) = target.field_mut(head) else {
        return Ok(false);
    };
    if rest.is_empty() {
        apply(slot)
    } else {
        slot.decode_inline(rest, value, apply)
    }
}
