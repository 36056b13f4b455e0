//! Aggregation Engine - 按任意键分组并统计
//!
//! 桶按首次出现的顺序保存，桶内保持插入顺序。收集完成后通常先 [`Grouping::sort_by_size`]
//! 再 [`Grouping::limit`]，最后用 [`Grouping::summary`] 计算每个桶的数值统计。

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;

use regex::Regex;

use crate::error::{LogError, Result};

/// 从元素计算分组键
pub type KeyFn<T, K> = Box<dyn Fn(&T) -> K + Send + Sync>;

/// `limit` 超出名次的桶如何处理
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitMode<K> {
    /// 合并到给定键的桶中
    Collapse(K),
    /// 直接丢弃
    Discard,
}

/// 有序分组
///
/// # 示例
///
/// ```
/// use mlog_parser::{Grouping, LimitMode};
///
/// let mut g = Grouping::with_key(|n: &u32| n % 3);
/// for n in 0..10 {
///     g.add(n);
/// }
/// g.sort_by_size();
/// assert_eq!(g.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
///
/// g.limit(1, LimitMode::Collapse(99));
/// assert_eq!(g.get(&99), Some(&[1, 4, 7, 2, 5, 8][..]));
/// ```
pub struct Grouping<K, T> {
    key_fn: KeyFn<T, K>,
    buckets: Vec<(K, Vec<T>)>,
    index: HashMap<K, usize>,
}

impl<K, T> Grouping<K, T>
where
    K: Eq + Hash + Clone,
{
    pub fn with_key<F>(key_fn: F) -> Self
    where
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        Self {
            key_fn: Box::new(key_fn),
            buckets: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// 创建分组并一次性加入 `items`
    pub fn from_items<I, F>(items: I, key_fn: F) -> Self
    where
        I: IntoIterator<Item = T>,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        let mut grouping = Self::with_key(key_fn);
        for item in items {
            grouping.add(item);
        }
        grouping
    }

    /// 按当前键函数加入元素
    pub fn add(&mut self, item: T) {
        let key = (self.key_fn)(&item);
        self.push(key, item);
    }

    /// 用临时的键函数加入元素，不改变已保存的键函数
    pub fn add_with<F>(&mut self, item: T, key_fn: F)
    where
        F: FnOnce(&T) -> K,
    {
        let key = key_fn(&item);
        self.push(key, item);
    }

    fn push(&mut self, key: K, item: T) {
        match self.index.get(&key) {
            Some(&i) => self.buckets[i].1.push(item),
            None => {
                self.index.insert(key.clone(), self.buckets.len());
                self.buckets.push((key, vec![item]));
            }
        }
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .buckets
            .iter()
            .enumerate()
            .map(|(i, (k, _))| (k.clone(), i))
            .collect();
    }

    pub fn get(&self, key: &K) -> Option<&[T]> {
        self.index.get(key).map(|&i| self.buckets[i].1.as_slice())
    }

    /// 桶的数量
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// 所有桶中元素的总数
    pub fn total(&self) -> usize {
        self.buckets.iter().map(|(_, items)| items.len()).sum()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.buckets.iter().map(|(k, _)| k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &[T])> {
        self.buckets.iter().map(|(k, items)| (k, items.as_slice()))
    }

    /// 换用新的键函数，按当前桶顺序重新分组已收集的元素
    pub fn regroup<F>(&mut self, key_fn: F)
    where
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.key_fn = Box::new(key_fn);
        let buckets = std::mem::take(&mut self.buckets);
        self.index.clear();
        for item in buckets.into_iter().flat_map(|(_, items)| items) {
            self.add(item);
        }
    }

    /// 把 `from` 桶的元素追加到 `to` 桶并删除 `from`；`from` 不存在时什么都不做
    pub fn move_items(&mut self, from: &K, to: &K) {
        if from == to {
            return;
        }
        let Some(i) = self.index.get(from).copied() else {
            return;
        };
        let (_, items) = self.buckets.remove(i);
        self.rebuild_index();
        for item in items {
            self.push(to.clone(), item);
        }
    }

    /// 按桶大小降序排列，大小相同的保持原有顺序
    pub fn sort_by_size(&mut self) {
        self.buckets.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
        self.rebuild_index();
    }

    /// 只保留前 `n` 个桶，其余按 `mode` 合并或丢弃
    ///
    /// 合并目标键已在前 `n` 个桶中时追加到该桶；没有可合并的元素时不创建合并桶。
    pub fn limit(&mut self, n: usize, mode: LimitMode<K>) {
        if self.buckets.len() <= n {
            return;
        }
        let rest = self.buckets.split_off(n);
        self.rebuild_index();

        if let LimitMode::Collapse(label) = mode {
            for item in rest.into_iter().flat_map(|(_, items)| items) {
                self.push(label.clone(), item);
            }
        }
    }

    /// 计算 `key` 桶中 `field` 的统计值，忽略取值为 `None` 的元素
    pub fn summary<F>(&self, key: &K, field: F) -> Option<Summary>
    where
        F: Fn(&T) -> Option<f64>,
    {
        Summary::from_values(self.get(key)?.iter().filter_map(field))
    }

    /// 按桶顺序计算每个桶的统计值
    pub fn summaries<F>(&self, field: F) -> Vec<(&K, Option<Summary>)>
    where
        F: Fn(&T) -> Option<f64>,
    {
        self.buckets
            .iter()
            .map(|(k, items)| (k, Summary::from_values(items.iter().filter_map(&field))))
            .collect()
    }
}

/// 用正则表达式从元素的文本形式中提取分组键
///
/// 有捕获组时取第一个捕获组，否则取整个匹配；不匹配时键为 `None`。
pub fn regex_key<T: Display + 'static>(
    pattern: &str,
) -> Result<impl Fn(&T) -> Option<String> + Send + Sync + 'static> {
    let re = Regex::new(pattern).map_err(|e| LogError::InvalidPattern(e.to_string()))?;
    Ok(move |item: &T| {
        let text = item.to_string();
        let caps = re.captures(&text)?;
        caps.get(1)
            .or_else(|| caps.get(0))
            .map(|m| m.as_str().to_string())
    })
}

/// 一个桶的数值统计
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Summary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub mean: f64,
    sorted: Vec<f64>,
}

impl Summary {
    /// 没有任何值时返回 `None`
    pub fn from_values<I: IntoIterator<Item = f64>>(values: I) -> Option<Self> {
        let mut sorted: Vec<f64> = values.into_iter().filter(|v| !v.is_nan()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let sum: f64 = sorted.iter().sum();
        Some(Self {
            count,
            min: sorted[0],
            max: sorted[count - 1],
            sum,
            mean: sum / count as f64,
            sorted,
        })
    }

    /// 第 `p` 百分位（0-100），相邻值之间线性插值
    pub fn percentile(&self, p: f64) -> f64 {
        let rank = (p.clamp(0.0, 100.0) / 100.0) * (self.count - 1) as f64;
        let lower = rank.floor() as usize;
        let upper = rank.ceil() as usize;
        let weight = rank - lower as f64;
        self.sorted[lower] + (self.sorted[upper] - self.sorted[lower]) * weight
    }

    pub fn median(&self) -> f64 {
        self.percentile(50.0)
    }
}
