//! Wire payloads for the Naver Finance endpoints, kept separate from the
//! domain models so upstream shape changes stay contained here.

use crate::models::kst;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;

/// Numbers are frequently formatted with thousands separators ("71,200").
pub fn parse_num(s: &str) -> Option<f64> {
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        None
    } else {
        cleaned.parse().ok()
    }
}

pub fn parse_int(s: &str) -> Option<i64> {
    parse_num(s).map(|v| v as i64)
}

/// Compact date, `20260729`.
pub fn parse_compact_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y%m%d").ok()
}

/// Compact minute timestamp, `202607291015`, interpreted as KST.
pub fn parse_compact_datetime(s: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s.trim(), "%Y%m%d%H%M").ok()?;
    kst()
        .from_local_datetime(&naive)
        .single()
        .map(|t| t.with_timezone(&Utc))
}

#[derive(Debug, Deserialize)]
pub struct DailyPriceRow {
    #[serde(rename = "localDate")]
    pub local_date: String,
    #[serde(rename = "openPrice")]
    pub open_price: String,
    #[serde(rename = "highPrice")]
    pub high_price: String,
    #[serde(rename = "lowPrice")]
    pub low_price: String,
    #[serde(rename = "closePrice")]
    pub close_price: String,
    #[serde(rename = "accumulatedTradingVolume")]
    pub volume: String,
}

#[derive(Debug, Deserialize)]
pub struct InvestorTrendRow {
    pub bizdate: String,
    #[serde(rename = "individualPureBuyQuantity")]
    pub individual_net: String,
    #[serde(rename = "organPureBuyQuantity")]
    pub institutional_net: String,
    #[serde(rename = "foreignerPureBuyQuantity")]
    pub foreign_net: String,
}

#[derive(Debug, Deserialize)]
pub struct MinutePriceRow {
    #[serde(rename = "localDateTime")]
    pub local_datetime: String,
    #[serde(rename = "currentPrice")]
    pub current_price: String,
    #[serde(rename = "changeAmount", default)]
    pub change_amount: Option<String>,
    #[serde(rename = "accumulatedTradingVolume")]
    pub volume: String,
    #[serde(rename = "buyQuantity", default)]
    pub bid_volume: Option<String>,
    #[serde(rename = "sellQuantity", default)]
    pub ask_volume: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewsPage {
    #[serde(default)]
    pub items: Vec<NewsRow>,
}

#[derive(Debug, Deserialize)]
pub struct NewsRow {
    pub title: String,
    #[serde(rename = "linkUrl")]
    pub link_url: String,
    #[serde(rename = "officeName", default)]
    pub office_name: String,
    /// `20260729180501` down to the second.
    #[serde(rename = "datetime")]
    pub datetime: String,
}

#[derive(Debug, Deserialize)]
pub struct StockIntegration {
    #[serde(rename = "totalInfos", default)]
    pub total_infos: Vec<TotalInfo>,
}

#[derive(Debug, Deserialize)]
pub struct TotalInfo {
    pub code: String,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EtfBasic {
    #[serde(rename = "nav", default)]
    pub nav: Option<String>,
    #[serde(rename = "totalExpenseRatio", default)]
    pub total_expense_ratio: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EtfComposition {
    #[serde(rename = "etfCompositionDatas", default)]
    pub items: Vec<EtfConstituentRow>,
}

#[derive(Debug, Deserialize)]
pub struct EtfConstituentRow {
    #[serde(rename = "itemCode")]
    pub item_code: String,
    #[serde(rename = "itemName")]
    pub item_name: String,
    #[serde(rename = "etfWeight", default)]
    pub weight: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExchangePage {
    #[serde(default)]
    pub stocks: Vec<ExchangeStockRow>,
    #[serde(rename = "totalCount", default)]
    pub total_count: u32,
}

#[derive(Debug, Deserialize)]
pub struct ExchangeStockRow {
    #[serde(rename = "itemCode")]
    pub item_code: String,
    #[serde(rename = "stockName")]
    pub stock_name: String,
    #[serde(rename = "industryCodeType", default)]
    pub industry: Option<IndustryCode>,
    #[serde(rename = "listedDate", default)]
    pub listed_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IndustryCode {
    #[serde(rename = "industryGroupKor", default)]
    pub industry_group: String,
}

#[derive(Debug, Deserialize)]
pub struct EtfItemList {
    pub result: EtfItemListResult,
}

#[derive(Debug, Deserialize)]
pub struct EtfItemListResult {
    #[serde(rename = "etfItemList", default)]
    pub etf_item_list: Vec<EtfItemRow>,
}

#[derive(Debug, Deserialize)]
pub struct EtfItemRow {
    pub itemcode: String,
    pub itemname: String,
}

#[derive(Debug, Deserialize)]
pub struct StockBasic {
    #[serde(rename = "stockName", default)]
    pub stock_name: Option<String>,
    #[serde(rename = "stockEndType", default)]
    pub stock_end_type: Option<String>,
}
