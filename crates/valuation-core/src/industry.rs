use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of industry classifications. `Unclassified` is the explicit default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Industry {
    Utilities,
    HeavyIndustry,
    Technology,
    Finance,
    Consumer,
    Healthcare,
    RealEstate,
    Manufacturing,
    Services,
    Unclassified,
}

/// The keyword found earliest in the name wins; ties go to the industry
/// declared first. ASCII keywords only match at the start of a word.
const KEYWORDS: &[(Industry, &[&str])] = &[
    (
        Industry::Utilities,
        &["电力", "水务", "燃气", "公用事业", "能源", "utilit", "power", "water", "gas"],
    ),
    (
        Industry::HeavyIndustry,
        &["钢铁", "水泥", "化工", "有色金属", "煤炭", "石油", "steel", "cement", "chemical", "mining", "coal", "oil"],
    ),
    (
        Industry::Technology,
        &["软件", "互联网", "计算机", "电子", "通信", "半导体", "芯片", "IT", "software", "internet", "semiconductor", "technology"],
    ),
    (
        Industry::Finance,
        &["银行", "证券", "保险", "金融", "bank", "insurance", "securities", "financ"],
    ),
    (
        Industry::Consumer,
        &["食品", "饮料", "零售", "纺织", "家电", "消费", "food", "beverage", "retail", "consumer", "apparel"],
    ),
    (
        Industry::Healthcare,
        &["医药", "医疗", "生物制药", "医疗器械", "pharma", "health", "medical", "biotech"],
    ),
    (
        Industry::RealEstate,
        &["房地产", "建筑", "工程", "real estate", "property", "construction"],
    ),
    (
        Industry::Manufacturing,
        &["机械", "汽车", "电气设备", "制造", "machinery", "automotive", "manufactur", "equipment"],
    ),
    (
        Industry::Services,
        &["传媒", "教育", "旅游", "文化", "娱乐", "media", "education", "travel", "entertainment"],
    ),
];

impl Industry {
    pub const ALL: [Industry; 10] = [
        Industry::Utilities,
        Industry::HeavyIndustry,
        Industry::Technology,
        Industry::Finance,
        Industry::Consumer,
        Industry::Healthcare,
        Industry::RealEstate,
        Industry::Manufacturing,
        Industry::Services,
        Industry::Unclassified,
    ];

    /// Map a free-form industry description to a variant.
    ///
    /// ASCII keywords are matched case-insensitively, except "IT" which must
    /// appear in upper case as a whole word so that words like "equity" do
    /// not match.
    pub fn classify(name: &str) -> Industry {
        let lowered = name.to_lowercase();
        let mut best: Option<(usize, Industry)> = None;
        for (industry, keywords) in KEYWORDS {
            let position = keywords
                .iter()
                .filter_map(|kw| {
                    if *kw == "IT" {
                        find_word(name, kw, true)
                    } else {
                        find_word(&lowered, kw, false)
                    }
                })
                .min();
            if let Some(pos) = position {
                if best.map_or(true, |(p, _)| pos < p) {
                    best = Some((pos, *industry));
                }
            }
        }
        best.map_or(Industry::Unclassified, |(_, industry)| industry)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Industry::Utilities => "utilities",
            Industry::HeavyIndustry => "heavy_industry",
            Industry::Technology => "technology",
            Industry::Finance => "finance",
            Industry::Consumer => "consumer",
            Industry::Healthcare => "healthcare",
            Industry::RealEstate => "real_estate",
            Industry::Manufacturing => "manufacturing",
            Industry::Services => "services",
            Industry::Unclassified => "unclassified",
        }
    }

    /// Industries whose cash flows are steady enough that the DCF alone is
    /// trusted when the two models disagree sharply.
    pub fn is_stable(&self) -> bool {
        matches!(
            self,
            Industry::Utilities | Industry::Finance | Industry::Consumer
        )
    }
}

/// Byte offset of the first occurrence of `keyword`. ASCII keywords must
/// start a word, and with `whole_word` must also end one.
fn find_word(haystack: &str, keyword: &str, whole_word: bool) -> Option<usize> {
    if !keyword.is_ascii() {
        return haystack.find(keyword);
    }
    let is_word_char = |c: char| c.is_ascii_alphanumeric();
    haystack.match_indices(keyword).map(|(i, _)| i).find(|&i| {
        let starts = haystack[..i].chars().next_back().map_or(true, |c| !is_word_char(c));
        let ends = haystack[i + keyword.len()..]
            .chars()
            .next()
            .map_or(true, |c| !is_word_char(c));
        starts && (!whole_word || ends)
    })
}

impl fmt::Display for Industry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which rate discounts the owner-earnings projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountBasis {
    RequiredReturn,
    Wacc,
}

/// Inputs to the revenue-based valuation of companies without usable cash flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueParameters {
    /// Industry price-to-sales multiple
    pub price_to_sales: f64,
    /// Years until a loss-making company is assumed to turn profitable
    pub years_to_profitability: u32,
    pub target_profit_margin: f64,
}

impl Default for RevenueParameters {
    fn default() -> Self {
        Self {
            price_to_sales: 2.5,
            years_to_profitability: 3,
            target_profit_margin: 0.10,
        }
    }
}

/// Risk parameters applied to one industry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndustryProfile {
    pub industry_id: Industry,
    pub beta: f64,
    /// Required return on equity for the owner-earnings model
    pub required_return: f64,
    /// Haircut applied to the owner-earnings value (0.15 = 15%)
    pub margin_of_safety: f64,
    /// Share of capex needed to sustain current capacity
    pub maintenance_capex_ratio: f64,
    pub terminal_growth_rate: f64,
    pub owner_earnings_discount: DiscountBasis,
    /// Use the median of historical owner earnings as the baseline (cyclical industries)
    #[serde(default)]
    pub normalize_earnings: bool,
    #[serde(default)]
    pub revenue: RevenueParameters,
}
