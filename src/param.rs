// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 参数存取模块
//!
//! 该模块提供对两类字符串映射表（请求标头、查询参数）的强类型访问，包括：
//! - 带默认值、必填校验和允许值枚举的 [`get_parameter`] 系列函数。
//! - 分隔符拆分的集合参数解析（有序 `Vec` 或去重 `BTreeSet`）。
//! - 人类可读标头名到传输层内部键（`HTTP_` 前缀）的映射。
//! - HTTP 状态码与标准原因短语的固定映射表。
//!
//! 所有函数都是纯读取，除日志外没有副作用。

use std::collections::{BTreeSet, HashMap};

use lazy_static::lazy_static;
use log::error;

use crate::exception::Exception;

/// HTTP 协议规定的换行符（Carriage Return Line Feed）
pub const CRLF: &str = "\r\n";

/// 选择处理器的查询参数名
pub const API_METHOD_PARAMETER: &str = "x-api-method";

lazy_static! {
    /// 本核心管理的 HTTP 状态码与其对应的标准原因短语映射表。
    ///
    /// 注意：这是一个封闭集合。响应层只允许使用表内的状态码，
    /// 其它任何状态码都被视为编程错误（参见 [`standard_message`]）。
    pub static ref STATUS_CODES: HashMap<u16, &'static str> = {
        let mut map = HashMap::new();
        map.insert(200, "OK");
        map.insert(201, "Created");
        map.insert(204, "No Content");
        map.insert(301, "Moved Permanently");
        map.insert(302, "Found");
        map.insert(307, "Temporary Redirect");
        map.insert(308, "Permanent Redirect");
        map.insert(400, "Bad Request");
        map.insert(401, "Unauthorized");
        map.insert(403, "Forbidden");
        map.insert(404, "Not Found");
        map.insert(500, "Internal Server Error");
        map
    };
}

/// 返回状态码对应的标准原因短语。
///
/// 表外的状态码说明代码编写出现了错误，直接 panic。
pub fn standard_message(code: u16) -> &'static str {
    match STATUS_CODES.get(&code) {
        Some(message) => message,
        None => {
            error!("非法的状态码：{}。这条错误说明代码编写出现了错误。", code);
            panic!("HTTP status code not managed: {}", code);
        }
    }
}

/// 原始参数字符串到强类型值的转换。
///
/// 每种目标类型各自定义转换失败的语义；失败时携带参数名和原始值。
pub trait FromParam: Sized {
    fn from_param(name: &str, raw: &str) -> Result<Self, Exception>;
}

impl FromParam for String {
    /// 字符串参数先把字面 `+` 替换为空格，再进行百分号解码。
    ///
    /// 顺序不可交换：如果先解码，原本编码过的加号（`%2B`）会被错误地
    /// 替换成空格。
    fn from_param(name: &str, raw: &str) -> Result<Self, Exception> {
        let plus_decoded = raw.replace('+', " ");
        match urlencoding::decode(&plus_decoded) {
            Ok(decoded) => Ok(decoded.into_owned()),
            Err(_) => Err(Exception::InvalidParameterValue {
                name: name.to_string(),
                value: raw.to_string(),
            }),
        }
    }
}

impl FromParam for bool {
    /// 布尔参数沿用传输层惯例：只有字面 `"true"` 为真，其它值一律为假。
    fn from_param(_name: &str, raw: &str) -> Result<Self, Exception> {
        Ok(raw == "true")
    }
}

macro_rules! from_param_numeric {
    ($($t:ty),*) => {
        $(
            impl FromParam for $t {
                fn from_param(name: &str, raw: &str) -> Result<Self, Exception> {
                    raw.parse::<$t>().map_err(|_| Exception::InvalidParameterValue {
                        name: name.to_string(),
                        value: raw.to_string(),
                    })
                }
            }
        )*
    };
}

from_param_numeric!(i32, i64, u64, f64);

/// 从映射表读取一个参数并转换为 `T`。
///
/// - 键不存在或值为空字符串时：`mandatory` 为真则返回
///   [`Exception::MissingParameter`]，否则返回 `default`。
/// - 值存在时按 [`FromParam`] 转换；`allowed` 非空时，转换后的值必须是
///   其成员，否则返回 [`Exception::InvalidParameterValue`]。
pub fn get_parameter<T>(
    map: &HashMap<String, String>,
    name: &str,
    default: T,
    mandatory: bool,
    allowed: &[T],
) -> Result<T, Exception>
where
    T: FromParam + PartialEq,
{
    match map.get(name) {
        Some(raw) if !raw.is_empty() => {
            let value = T::from_param(name, raw)?;
            if !allowed.is_empty() && !allowed.contains(&value) {
                error!("参数{}的值{}不在允许值列表内", name, raw);
                return Err(Exception::InvalidParameterValue {
                    name: name.to_string(),
                    value: raw.to_string(),
                });
            }
            Ok(value)
        }
        _ => {
            if mandatory {
                error!("缺少必需的参数：{}", name);
                return Err(Exception::MissingParameter(name.to_string()));
            }
            Ok(default)
        }
    }
}

/// 同 [`get_parameter`]，但缺失只产生 `None`，从不视为错误。
pub fn get_optional_parameter<T>(
    map: &HashMap<String, String>,
    name: &str,
    allowed: &[T],
) -> Result<Option<T>, Exception>
where
    T: FromParam + PartialEq,
{
    match map.get(name) {
        Some(raw) if !raw.is_empty() => {
            let value = T::from_param(name, raw)?;
            if !allowed.is_empty() && !allowed.contains(&value) {
                error!("参数{}的值{}不在允许值列表内", name, raw);
                return Err(Exception::InvalidParameterValue {
                    name: name.to_string(),
                    value: raw.to_string(),
                });
            }
            Ok(Some(value))
        }
        _ => Ok(None),
    }
}

/// 按分隔符拆分参数值并逐项转换，保留顺序与重复项。
///
/// 空 token 被跳过；任意一项转换失败即整体失败。
pub fn get_delimited_parameter<T>(
    map: &HashMap<String, String>,
    name: &str,
    delimiter: char,
    default: Vec<T>,
    mandatory: bool,
) -> Result<Vec<T>, Exception>
where
    T: FromParam,
{
    match map.get(name) {
        Some(raw) if !raw.is_empty() => {
            let mut values = Vec::new();
            for token in raw.split(delimiter) {
                if token.is_empty() {
                    continue;
                }
                values.push(T::from_param(name, token)?);
            }
            Ok(values)
        }
        _ => {
            if mandatory {
                error!("缺少必需的参数：{}", name);
                return Err(Exception::MissingParameter(name.to_string()));
            }
            Ok(default)
        }
    }
}

/// 按分隔符拆分参数值并收集为去重集合，不保证顺序语义。
pub fn get_delimited_set_parameter<T>(
    map: &HashMap<String, String>,
    name: &str,
    delimiter: char,
    default: BTreeSet<T>,
    mandatory: bool,
) -> Result<BTreeSet<T>, Exception>
where
    T: FromParam + Ord,
{
    match map.get(name) {
        Some(raw) if !raw.is_empty() => {
            let mut values = BTreeSet::new();
            for token in raw.split(delimiter) {
                if token.is_empty() {
                    continue;
                }
                values.insert(T::from_param(name, token)?);
            }
            Ok(values)
        }
        _ => {
            if mandatory {
                error!("缺少必需的参数：{}", name);
                return Err(Exception::MissingParameter(name.to_string()));
            }
            Ok(default)
        }
    }
}

/// 将人类可读的标头名映射为传输层环境变量键。
///
/// 规则：全部大写，非字母数字字符替换为下划线，最后加 `HTTP_` 前缀。
/// 例如 `x-forwarded-for` 映射为 `HTTP_X_FORWARDED_FOR`。
pub fn header_key(header_name: &str) -> String {
    let mut key = String::with_capacity(header_name.len() + 5);
    key.push_str("HTTP_");
    for c in header_name.chars() {
        if c.is_ascii_alphanumeric() {
            key.push(c.to_ascii_uppercase());
        } else {
            key.push('_');
        }
    }
    key
}

/// 按标头名读取参数。查找键经过 [`header_key`] 映射。
pub fn get_header_parameter<T>(
    map: &HashMap<String, String>,
    header_name: &str,
    default: T,
    mandatory: bool,
    allowed: &[T],
) -> Result<T, Exception>
where
    T: FromParam + PartialEq,
{
    get_parameter(map, &header_key(header_name), default, mandatory, allowed)
}
