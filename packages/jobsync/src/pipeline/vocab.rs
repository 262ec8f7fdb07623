//! Option vocabularies of the destination table.
//!
//! Free-text attributes are snapped onto the table's select options: exact
//! match first, then containment either way (in option order), then the
//! alias table, then the vocabulary's fallback.

/// A closed set of select options plus aliases.
#[derive(Debug, Clone, Copy)]
pub struct Vocabulary {
    pub options: &'static [&'static str],
    /// (substring, option) pairs tried in order after direct matching fails
    pub aliases: &'static [(&'static str, &'static str)],
    /// Option used when nothing matches; `None` keeps the input text
    pub fallback: Option<&'static str>,
}

impl Vocabulary {
    /// Snap `text` onto an option. Blank input yields `None`.
    pub fn resolve(&self, text: &str) -> Option<String> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        if let Some(option) = self.options.iter().find(|o| **o == text) {
            return Some((*option).to_string());
        }

        if let Some(option) = self
            .options
            .iter()
            .find(|o| text.contains(**o) || o.contains(text))
        {
            return Some((*option).to_string());
        }

        if let Some((_, option)) = self.aliases.iter().find(|(alias, _)| text.contains(alias)) {
            return Some((*option).to_string());
        }

        Some(self.fallback.unwrap_or(text).to_string())
    }

    pub fn contains(&self, option: &str) -> bool {
        self.options.contains(&option)
    }
}

pub const COMPANY_TYPES: Vocabulary = Vocabulary {
    options: &["民营企业", "国有企业", "央企", "外资企业", "创业公司", "其他"],
    aliases: &[
        ("民营", "民营企业"),
        ("私企", "民营企业"),
        ("国企", "国有企业"),
        ("央企", "央企"),
        ("外企", "外资企业"),
        ("外资", "外资企业"),
        ("合资", "外资企业"),
        ("创业", "创业公司"),
        ("初创", "创业公司"),
    ],
    fallback: Some("其他"),
};

pub const INDUSTRIES: Vocabulary = Vocabulary {
    options: &[
        "互联网", "金融", "制造业", "教育", "医疗", "房地产", "零售", "能源", "其他",
    ],
    aliases: &[
        ("IT", "互联网"),
        ("软件", "互联网"),
        ("电商", "互联网"),
        ("游戏", "互联网"),
        ("计算机", "互联网"),
        ("银行", "金融"),
        ("证券", "金融"),
        ("基金", "金融"),
        ("保险", "金融"),
        ("制造", "制造业"),
        ("汽车", "制造业"),
        ("医药", "医疗"),
        ("电力", "能源"),
    ],
    fallback: Some("其他"),
};

pub const EDUCATION_LEVELS: Vocabulary = Vocabulary {
    options: &["本科", "硕士", "博士", "本科及以上", "硕士及以上", "不限"],
    aliases: &[
        ("学士", "本科"),
        ("研究生", "硕士"),
        ("bachelor", "本科"),
        ("master", "硕士"),
        ("phd", "博士"),
        ("学历不限", "不限"),
    ],
    fallback: Some("本科及以上"),
};

pub const TARGETS: Vocabulary = Vocabulary {
    options: &["2026届", "2025届", "2024届", "往届"],
    aliases: &[("应届", "2026届"), ("社招", "往届")],
    fallback: Some("2026届"),
};

/// Recruiting batches, longest first so that 秋招提前批 wins over 秋招.
pub const BATCH_KEYWORDS: &[&str] = &[
    "春招提前批",
    "秋招提前批",
    "春招补录",
    "秋招补录",
    "寒假实习",
    "暑期实习",
    "日常实习",
    "春招",
    "秋招",
];

/// Match a batch string against the known keywords; unknown text is kept.
pub fn resolve_batch(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let matched = BATCH_KEYWORDS
        .iter()
        .find(|keyword| text.contains(**keyword))
        .copied()
        .unwrap_or(text);
    Some(matched.to_string())
}

/// Every target option mentioned in `text`; an alias match or the fallback
/// when none is.
pub fn resolve_targets(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    let found: Vec<String> = TARGETS
        .options
        .iter()
        .filter(|option| text.contains(**option))
        .map(|option| (*option).to_string())
        .collect();
    if found.is_empty() {
        TARGETS.resolve(text).into_iter().collect()
    } else {
        found
    }
}
