//! Deterministic RAG prompt assembly from stored data, for the ai-prompt
//! endpoints. No model calls happen here; the caller ships the text to
//! whatever LLM the frontend is wired to.

use super::metrics::PriceMetrics;
use crate::models::{NewsItem, TickerInfo, TradingFlow};
use std::fmt::Write;

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.2}")).unwrap_or_else(|| "N/A".into())
}

/// Single-ticker analysis prompt.
pub fn build_prompt(
    info: &TickerInfo,
    metrics: Option<&PriceMetrics>,
    flows: &[TradingFlow],
    news: &[NewsItem],
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "다음은 {} ({})에 대한 수집 데이터입니다. 이 데이터만 근거로 투자 분석을 작성하세요.",
        info.name, info.ticker
    );
    let _ = writeln!(out, "\n[기본 정보]");
    let _ = writeln!(out, "- 유형: {}", info.asset_type.as_str());
    if !info.theme.is_empty() {
        let _ = writeln!(out, "- 테마: {}", info.theme);
    }

    let _ = writeln!(out, "\n[가격 지표]");
    match metrics {
        Some(m) => {
            let _ = writeln!(
                out,
                "- 기간: {} ~ {} ({}거래일)",
                m.start_date, m.end_date, m.trading_days
            );
            let _ = writeln!(out, "- 기간 수익률: {:.2}%", m.period_return);
            let _ = writeln!(out, "- 연환산 수익률: {}%", fmt_opt(m.annualized_return));
            let _ = writeln!(out, "- 연환산 변동성: {:.2}%", m.annualized_volatility);
            let _ = writeln!(out, "- 최대 낙폭: {:.2}%", m.max_drawdown);
            let _ = writeln!(out, "- 샤프 비율: {}", fmt_opt(m.sharpe_ratio));
        }
        None => {
            let _ = writeln!(out, "- 가격 데이터 부족");
        }
    }

    if !flows.is_empty() {
        let foreign: i64 = flows.iter().map(|f| f.foreign_net).sum();
        let institutional: i64 = flows.iter().map(|f| f.institutional_net).sum();
        let individual: i64 = flows.iter().map(|f| f.individual_net).sum();
        let _ = writeln!(out, "\n[수급 ({}일 누적)]", flows.len());
        let _ = writeln!(out, "- 외국인: {foreign:+}");
        let _ = writeln!(out, "- 기관: {institutional:+}");
        let _ = writeln!(out, "- 개인: {individual:+}");
    }

    if !news.is_empty() {
        let _ = writeln!(out, "\n[최근 뉴스]");
        for item in news.iter().take(10) {
            let _ = writeln!(out, "- [{}] {}", item.date, item.title);
        }
    }

    let _ = writeln!(
        out,
        "\n위 데이터를 바탕으로 1) 현황 요약 2) 긍정 요인 3) 리스크 4) 투자 의견을 제시하세요."
    );
    out
}

/// Multi-ticker prompt: per-ticker sections plus a comparison instruction.
pub fn build_multi_prompt(sections: &[String]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "다음은 {}개 종목의 수집 데이터입니다. 각 종목을 분석한 뒤 상호 비교하세요.",
        sections.len()
    );
    for (i, section) in sections.iter().enumerate() {
        let _ = writeln!(out, "\n===== 종목 {} =====", i + 1);
        out.push_str(section);
    }
    let _ = writeln!(out, "\n마지막에 포트폴리오 관점의 종합 의견을 덧붙이세요.");
    out
}
