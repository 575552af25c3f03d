//! Idempotent SQLite schema. Applied on every startup.

/// Schema with pragmas tuned for a read-heavy service with periodic batch
/// writes. All composite uniqueness the ingestion path relies on lives here.
pub const SCHEMA_SQL: &str = r#"
-- WAL for concurrent reads during collection writes
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;
PRAGMA cache_size = -16000;  -- 16MB cache
PRAGMA temp_store = MEMORY;

-- Registered watchlist
CREATE TABLE IF NOT EXISTS tickers (
    ticker TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    asset_type TEXT NOT NULL,
    theme TEXT NOT NULL DEFAULT '',
    launch_date TEXT,
    expense_ratio REAL,
    purchase_date TEXT,
    purchase_price REAL,
    quantity REAL,
    search_keyword TEXT,
    relevance_keywords TEXT NOT NULL DEFAULT '[]',
    display_order INTEGER NOT NULL DEFAULT 0
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS daily_bars (
    ticker TEXT NOT NULL,
    date TEXT NOT NULL,
    open REAL NOT NULL,
    high REAL NOT NULL,
    low REAL NOT NULL,
    close REAL NOT NULL,
    volume INTEGER NOT NULL,
    daily_change_pct REAL,
    PRIMARY KEY (ticker, date)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS trading_flows (
    ticker TEXT NOT NULL,
    date TEXT NOT NULL,
    individual_net INTEGER NOT NULL,
    institutional_net INTEGER NOT NULL,
    foreign_net INTEGER NOT NULL,
    PRIMARY KEY (ticker, date)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS intraday_ticks (
    ticker TEXT NOT NULL,
    datetime TEXT NOT NULL,
    price REAL NOT NULL,
    change_amount REAL NOT NULL,
    volume INTEGER NOT NULL,
    bid_volume INTEGER NOT NULL,
    ask_volume INTEGER NOT NULL,
    PRIMARY KEY (ticker, datetime)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS news (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ticker TEXT NOT NULL,
    date TEXT NOT NULL,
    title TEXT NOT NULL,
    url TEXT NOT NULL,
    source TEXT NOT NULL DEFAULT '',
    relevance_score REAL NOT NULL DEFAULT 0,
    sentiment TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    UNIQUE (ticker, url)
);

CREATE TABLE IF NOT EXISTS stock_fundamentals (
    ticker TEXT NOT NULL,
    date TEXT NOT NULL,
    per REAL,
    pbr REAL,
    roe REAL,
    eps REAL,
    bps REAL,
    PRIMARY KEY (ticker, date)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS etf_fundamentals (
    ticker TEXT NOT NULL,
    date TEXT NOT NULL,
    nav REAL,
    expense_ratio REAL,
    PRIMARY KEY (ticker, date)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS etf_holdings (
    ticker TEXT NOT NULL,
    date TEXT NOT NULL,
    constituent_ticker TEXT NOT NULL,
    name TEXT NOT NULL DEFAULT '',
    weight REAL NOT NULL DEFAULT 0,
    PRIMARY KEY (ticker, date, constituent_ticker)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS collection_state (
    ticker TEXT PRIMARY KEY,
    last_price_date TEXT,
    last_trading_flow_date TEXT,
    last_news_collected_at TEXT,
    price_records_count INTEGER NOT NULL DEFAULT 0,
    trading_flow_records_count INTEGER NOT NULL DEFAULT 0,
    news_records_count INTEGER NOT NULL DEFAULT 0,
    last_collection_attempt TEXT,
    last_successful_collection TEXT,
    consecutive_failures INTEGER NOT NULL DEFAULT 0
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS alert_rules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ticker TEXT NOT NULL,
    alert_type TEXT NOT NULL,
    direction TEXT NOT NULL,
    target_price REAL NOT NULL,
    memo TEXT NOT NULL DEFAULT '',
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    last_triggered_at TEXT
);

CREATE TABLE IF NOT EXISTS alert_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    rule_id INTEGER NOT NULL,
    ticker TEXT NOT NULL,
    alert_type TEXT NOT NULL,
    message TEXT NOT NULL,
    triggered_at TEXT NOT NULL
);

-- Broad discoverable universe with screener snapshot columns
CREATE TABLE IF NOT EXISTS catalog (
    ticker TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    asset_type TEXT NOT NULL,
    market TEXT NOT NULL,
    sector TEXT NOT NULL DEFAULT '',
    listed_date TEXT,
    last_updated TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    close_price REAL,
    daily_change_pct REAL,
    volume INTEGER,
    weekly_return REAL,
    foreign_net INTEGER,
    institutional_net INTEGER,
    catalog_updated_at TEXT
) WITHOUT ROWID;

-- Stored integration secrets (settings/api-keys)
CREATE TABLE IF NOT EXISTS api_keys (
    service TEXT PRIMARY KEY,
    value TEXT NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_bars_ticker_date ON daily_bars(ticker, date DESC);
CREATE INDEX IF NOT EXISTS idx_flows_ticker_date ON trading_flows(ticker, date DESC);
CREATE INDEX IF NOT EXISTS idx_ticks_ticker_dt ON intraday_ticks(ticker, datetime DESC);
CREATE INDEX IF NOT EXISTS idx_news_ticker_date ON news(ticker, date DESC);
CREATE INDEX IF NOT EXISTS idx_alert_rules_ticker ON alert_rules(ticker, is_active);
CREATE INDEX IF NOT EXISTS idx_alert_history_ticker ON alert_history(ticker, triggered_at DESC);
CREATE INDEX IF NOT EXISTS idx_alert_history_rule ON alert_history(rule_id);
CREATE INDEX IF NOT EXISTS idx_catalog_weekly ON catalog(weekly_return DESC);
CREATE INDEX IF NOT EXISTS idx_catalog_sector ON catalog(sector);
"#;

/// Tables purged by `reset_market_data`, in delete order.
pub const MARKET_DATA_TABLES: &[&str] = &[
    "daily_bars",
    "trading_flows",
    "intraday_ticks",
    "news",
    "stock_fundamentals",
    "etf_fundamentals",
    "etf_holdings",
    "collection_state",
];

/// Every table reported by `stats()`.
pub const ALL_TABLES: &[&str] = &[
    "tickers",
    "daily_bars",
    "trading_flows",
    "intraday_ticks",
    "news",
    "stock_fundamentals",
    "etf_fundamentals",
    "etf_holdings",
    "collection_state",
    "alert_rules",
    "alert_history",
    "catalog",
];
