//! 字符串相似度（模糊搜索）
//!
//! Levenshtein 编辑距离归一化到 0..=1，供画作 / 考题主题查找时给出
//! "你是不是要找"建议。

/// 建议阈值：相似度高于此值才值得提示
pub const SUGGESTION_THRESHOLD: f64 = 0.4;

/// 两段文本的相似度（不区分大小写，1.0 表示相同）
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    let (longer, shorter) = if a.len() >= b.len() { (&a, &b) } else { (&b, &a) };

    if longer.is_empty() {
        return 1.0;
    }

    let distance = levenshtein(longer, shorter);
    (longer.len() - distance) as f64 / longer.len() as f64
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    let mut costs: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut last = i;
        costs[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let new = if ca == cb {
                last
            } else {
                1 + last.min(costs[j]).min(costs[j + 1])
            };
            last = costs[j + 1];
            costs[j + 1] = new;
        }
    }
    costs[b.len()]
}

/// 在候选中找与目标最相似的一个，返回 (候选, 相似度)
pub fn best_match<'a>(target: &str, candidates: impl IntoIterator<Item = &'a str>) -> Option<(&'a str, f64)> {
    candidates
        .into_iter()
        .map(|c| (c, similarity(target, c)))
        .max_by(|x, y| x.1.total_cmp(&y.1))
}
