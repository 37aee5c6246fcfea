//! Каталог категорий: имя <-> префикс ключа.
//!
//! Таблица статическая; порядок таблицы: порядок перечисления и порядок раскрытия "all".

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::{Error, Result};

/// Специальный селектор "все категории".
pub const ALL: &str = "all";

/// Категория: неизменяемая пара (имя, префикс).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Category {
    pub name: &'static str,
    pub prefix: &'static [u8],
}

impl Category {
    /// Префикс в base64 (для листинга и логов).
    pub fn prefix_b64(&self) -> String {
        STANDARD.encode(self.prefix)
    }

    /// Имя файла архива категории.
    pub fn archive_file_name(&self) -> String {
        format!("{}.json.gz", self.name)
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        key.starts_with(self.prefix)
    }
}

const CATEGORIES: &[Category] = &[
    Category { name: "block-hash", prefix: b"\x00" },
    Category { name: "block-confirmed", prefix: b"\x01" },
    Category { name: "block-height", prefix: b"\x02" },
    Category { name: "block-transaction-hash", prefix: b"\x10" },
    Category { name: "block-transaction-source", prefix: b"\x11" },
    Category { name: "block-transaction-confirmed", prefix: b"\x12" },
    Category { name: "block-transaction-account", prefix: b"\x13" },
    Category { name: "block-transaction-block", prefix: b"\x14" },
    Category { name: "block-operation-hash", prefix: b"\x20" },
    Category { name: "block-operation-txhash", prefix: b"\x21" },
    Category { name: "block-operation-source", prefix: b"\x22" },
    Category { name: "block-operation-target", prefix: b"\x23" },
    Category { name: "block-operation-peers", prefix: b"\x24" },
    Category { name: "block-operation-type-source", prefix: b"\x25" },
    Category { name: "block-operation-type-target", prefix: b"\x26" },
    Category { name: "block-operation-type-peers", prefix: b"\x27" },
    Category { name: "block-operation-createfrozen", prefix: b"\x28" },
    Category { name: "block-operation-frozenlinked", prefix: b"\x29" },
    Category { name: "block-operation-blockheight", prefix: b"\x2a" },
    Category { name: "block-account-address", prefix: b"\x30" },
    Category { name: "block-account-created", prefix: b"\x31" },
    Category { name: "block-account-sequenceid", prefix: b"\x32" },
    Category { name: "block-account-sequenceidbyaddress", prefix: b"\x33" },
    Category { name: "transaction-pool", prefix: b"\x40" },
    Category { name: "internal", prefix: b"\x50" },
];

/// Все категории в порядке каталога.
pub fn all() -> &'static [Category] {
    CATEGORIES
}

pub fn by_name(name: &str) -> Option<Category> {
    CATEGORIES.iter().copied().find(|c| c.name == name)
}

pub fn by_prefix(prefix: &[u8]) -> Option<Category> {
    CATEGORIES.iter().copied().find(|c| c.prefix == prefix)
}

/// Категория, которой принадлежит ключ (по префиксу).
pub fn of_key(key: &[u8]) -> Option<Category> {
    CATEGORIES.iter().copied().find(|c| c.contains_key(key))
}

/// Разрешить выбор категорий.
///
/// - пустой выбор или "all" среди имён: все категории в порядке каталога;
/// - иначе: указанные имена в порядке первого упоминания, без повторов;
/// - неизвестные имена собираются все сразу и возвращаются одной Validation-ошибкой.
pub fn resolve_selection<S: AsRef<str>>(selection: &[S]) -> Result<Vec<Category>> {
    let mut unknown: Vec<String> = Vec::new();
    let mut picked: Vec<Category> = Vec::new();
    let mut want_all = selection.is_empty();

    for s in selection {
        let name = s.as_ref().trim();
        if name == ALL {
            want_all = true;
            continue;
        }
        match by_name(name) {
            Some(c) => {
                if !picked.contains(&c) {
                    picked.push(c);
                }
            }
            None => unknown.push(name.to_string()),
        }
    }

    if !unknown.is_empty() {
        return Err(Error::validation(format!(
            "unknown category found: {}",
            unknown.join(", ")
        )));
    }

    if want_all {
        return Ok(CATEGORIES.to_vec());
    }
    Ok(picked)
}

/// Листинг каталога: заголовок, разделитель и строка на категорию (prefix в base64).
pub fn render_listing() -> String {
    let width = CATEGORIES
        .iter()
        .map(|c| c.name.len())
        .max()
        .unwrap_or(0)
        .max("key name".len());

    let header = format!("{:>width$} : base64 encoded", "key name", width = width);
    let lines: Vec<String> = CATEGORIES
        .iter()
        .map(|c| format!("{:>width$} : '{}'", c.name, c.prefix_b64(), width = width))
        .collect();
    let max_len = lines
        .iter()
        .map(|l| l.len())
        .chain(std::iter::once(header.len()))
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    out.push_str(&header);
    out.push('\n');
    out.push_str(&"-".repeat(max_len + 2));
    out.push('\n');
    for l in lines {
        out.push_str(&l);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_are_unique_and_not_nested() {
        for (i, a) in CATEGORIES.iter().enumerate() {
            for b in &CATEGORIES[i + 1..] {
                assert_ne!(a.name, b.name);
                assert!(!a.prefix.starts_with(b.prefix), "{} vs {}", a.name, b.name);
                assert!(!b.prefix.starts_with(a.prefix), "{} vs {}", a.name, b.name);
            }
        }
    }

    #[test]
    fn name_prefix_roundtrip() {
        for c in all() {
            assert_eq!(by_name(c.name), Some(*c));
            assert_eq!(by_prefix(c.prefix), Some(*c));
        }
        assert_eq!(by_name("nope"), None);
        assert_eq!(of_key(b"\x02\x00\x00\x01").map(|c| c.name), Some("block-height"));
    }

    #[test]
    fn empty_and_all_select_everything() {
        let empty: [&str; 0] = [];
        assert_eq!(resolve_selection(&empty).unwrap().len(), all().len());
        assert_eq!(resolve_selection(&["all"]).unwrap(), all().to_vec());
        assert_eq!(
            resolve_selection(&["block-height", "all"]).unwrap(),
            all().to_vec()
        );
    }

    #[test]
    fn explicit_selection_keeps_order_and_dedups() {
        let got = resolve_selection(&["internal", "block-hash", "internal"]).unwrap();
        let names: Vec<&str> = got.iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["internal", "block-hash"]);
    }

    #[test]
    fn unknown_names_are_all_reported() {
        let err = resolve_selection(&["block-hash", "foo", "bar"]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("foo") && msg.contains("bar"), "{msg}");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn listing_has_every_category() {
        let out = render_listing();
        assert_eq!(out.lines().count(), all().len() + 2);
        assert!(out.contains("block-height : 'Ag=='"));
    }
}
