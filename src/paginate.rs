//! paginate: цикл курсорной пагинации по одной категории.
//!
//! cursor = none
//! loop:
//!   (отмена?) -> Cancelled
//!   page = source.fetch_page(prefix, cursor, limit)
//!   consume(item) для каждого элемента
//!   len(page) < page.limit -> стоп
//!   cursor = последний ключ страницы
//!
//! Контракт источника: курсор: строго исключающая нижняя граница.
//! Если источник всё же вернул курсорный ключ первым элементом (инклюзивный сервер),
//! этот элемент отбрасывается (одно предупреждение на категорию); проверка исчерпания
//! всё равно идёт по "сырой" длине страницы. Ключ вне префикса или не строго больше
//! предыдущего: Decode-ошибка.

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::catalog::Category;
use crate::error::{Error, Result};
use crate::item::{b64_display, Item};
use crate::metrics::record_page;

/// Страница: элементы и limit, который источник фактически применил.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<Item>,
    /// 0: источник не сообщил limit (берём запрошенный).
    pub limit: usize,
}

/// Источник страниц (Local/Remote accessor или тестовый фейк).
pub trait PageSource {
    fn fetch_page(&mut self, prefix: &[u8], cursor: Option<&[u8]>, limit: usize) -> Result<Page>;
}

/// Состояние/итог пагинации категории. Заполняется по ходу: при ошибке в нём
/// остаётся последний курсор для ручного возобновления.
#[derive(Debug, Clone, Default)]
pub struct PaginateStats {
    pub fetches: u64,
    pub items: u64,
    pub skipped_boundary: u64,
    pub last_cursor: Option<Vec<u8>>,
}

impl PaginateStats {
    pub fn last_cursor_b64(&self) -> String {
        self.last_cursor
            .as_deref()
            .map(b64_display)
            .unwrap_or_else(|| "null".to_string())
    }
}

pub struct Paginator<'c> {
    limit: usize,
    progress_every: u64,
    cancel: &'c CancellationToken,
}

impl<'c> Paginator<'c> {
    pub fn new(limit: usize, progress_every: u64, cancel: &'c CancellationToken) -> Self {
        Self {
            limit: limit.max(1),
            progress_every,
            cancel,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Пройти категорию целиком, отдавая элементы в consume по порядку ключей.
    pub fn run<S, F>(
        &self,
        source: &mut S,
        category: &Category,
        stats: &mut PaginateStats,
        mut consume: F,
    ) -> Result<()>
    where
        S: PageSource + ?Sized,
        F: FnMut(&Item) -> Result<()>,
    {
        let prefix = category.prefix;
        let mut cursor: Option<Vec<u8>> = None;
        let mut warned_inclusive = false;

        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            debug!(
                "fetch page: category={} cursor={} limit={}",
                category.name,
                cursor.as_deref().map(b64_display).unwrap_or_else(|| "null".to_string()),
                self.limit
            );
            let page = source.fetch_page(prefix, cursor.as_deref(), self.limit)?;
            stats.fetches += 1;
            record_page(page.items.len());

            let effective_limit = if page.limit == 0 { self.limit } else { page.limit };
            let raw_len = page.items.len();
            let mut consumed_in_page = 0usize;

            for (i, item) in page.items.into_iter().enumerate() {
                if !category.contains_key(&item.key) {
                    return Err(Error::decode(format!(
                        "key {} is outside category {}",
                        b64_display(&item.key),
                        category.name
                    )));
                }

                if let Some(c) = cursor.as_deref() {
                    if i == 0 && item.key.as_slice() == c {
                        if !warned_inclusive {
                            warn!(
                                "source returned the cursor key inclusively (category={}); dropping boundary record",
                                category.name
                            );
                            warned_inclusive = true;
                        }
                        stats.skipped_boundary += 1;
                        continue;
                    }
                    if item.key.as_slice() <= c {
                        return Err(Error::decode(format!(
                            "non-monotonic page in {}: key {} <= cursor {}",
                            category.name,
                            b64_display(&item.key),
                            b64_display(c)
                        )));
                    }
                }

                consume(&item)?;
                stats.items += 1;
                consumed_in_page += 1;
                if self.progress_every > 0 && stats.items % self.progress_every == 0 {
                    info!("got items: category={} count={}", category.name, stats.items);
                }

                // следующий элемент страницы сравнивается с этим ключом
                cursor = Some(item.key);
                stats.last_cursor = cursor.clone();
            }

            if raw_len < effective_limit {
                break;
            }
            if consumed_in_page == 0 {
                return Err(Error::decode(format!(
                    "pagination made no progress in {} at cursor {}",
                    category.name,
                    stats.last_cursor_b64()
                )));
            }
        }

        debug!(
            "category done: {} items={} fetches={}",
            category.name, stats.items, stats.fetches
        );
        Ok(())
    }
}
