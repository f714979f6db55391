use serde::Deserialize;

// ---------------------------------------------------------------------------
// API response types (mirror routes.rs shapes)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
#[allow(dead_code)]
pub struct TableCounts {
    pub stocks: i64,
    pub performance: i64,
    pub daily_candles: i64,
    pub candles: i64,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[allow(dead_code)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub market_open: bool,
    pub counts: TableCounts,
    pub cached_series: usize,
    pub rows_written: u64,
    pub last_write_at_ms: Option<i64>,
    pub last_maintenance_at_ms: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[allow(dead_code)]
pub struct LatencyResponse {
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
    pub sample_count: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct PerformanceResponse {
    pub ticker: String,
    pub ticker_type: String,
    pub perf_1m: f64,
    pub perf_3m: f64,
    pub perf_6m: f64,
    pub perf_1y: f64,
    pub last_updated: String,
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Error(String),
    Connecting,
}

/// Which performance table the body shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Sector,
    Industry,
}

impl View {
    pub fn toggle(self) -> Self {
        match self {
            View::Sector => View::Industry,
            View::Industry => View::Sector,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            View::Sector => " SECTORS ",
            View::Industry => " INDUSTRIES ",
        }
    }
}

/// Column the performance table is ordered by, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    OneMonth,
    ThreeMonths,
    SixMonths,
    OneYear,
}

impl SortKey {
    pub fn next(self) -> Self {
        match self {
            SortKey::OneMonth => SortKey::ThreeMonths,
            SortKey::ThreeMonths => SortKey::SixMonths,
            SortKey::SixMonths => SortKey::OneYear,
            SortKey::OneYear => SortKey::OneMonth,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortKey::OneMonth => "1M",
            SortKey::ThreeMonths => "3M",
            SortKey::SixMonths => "6M",
            SortKey::OneYear => "1Y",
        }
    }

    fn value(self, p: &PerformanceResponse) -> f64 {
        match self {
            SortKey::OneMonth => p.perf_1m,
            SortKey::ThreeMonths => p.perf_3m,
            SortKey::SixMonths => p.perf_6m,
            SortKey::OneYear => p.perf_1y,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub status: ConnectionStatus,
    pub health: HealthResponse,
    pub latency: LatencyResponse,
    pub sectors: Vec<PerformanceResponse>,
    pub industries: Vec<PerformanceResponse>,
    pub view: View,
    pub sort: SortKey,
    pub last_refresh: std::time::Instant,
    pub base_url: String,
}

impl AppState {
    pub fn new(base_url: String) -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            health: HealthResponse::default(),
            latency: LatencyResponse::default(),
            sectors: Vec::new(),
            industries: Vec::new(),
            view: View::Sector,
            sort: SortKey::ThreeMonths,
            last_refresh: std::time::Instant::now(),
            base_url,
        }
    }

    /// Rows of the current view, sorted by the current key.
    pub fn displayed(&self) -> Vec<&PerformanceResponse> {
        let source = match self.view {
            View::Sector => &self.sectors,
            View::Industry => &self.industries,
        };
        let mut rows: Vec<&PerformanceResponse> = source.iter().collect();
        rows.sort_by(|a, b| self.sort.value(b).total_cmp(&self.sort.value(a)));
        rows
    }

    pub async fn refresh(&mut self, client: &reqwest::Client) {
        let health_url = format!("{}/health", self.base_url);
        let sectors_url = format!("{}/performance?type=Sector", self.base_url);
        let industries_url = format!("{}/performance?type=Industry", self.base_url);
        let latency_url = format!("{}/stats/latency", self.base_url);

        let (health_res, sectors_res, industries_res, latency_res) = tokio::join!(
            client.get(&health_url).send(),
            client.get(&sectors_url).send(),
            client.get(&industries_url).send(),
            client.get(&latency_url).send(),
        );

        let (health_res, sectors_res, industries_res) = match (health_res, sectors_res, industries_res) {
            (Ok(h), Ok(s), Ok(i)) => (h, s, i),
            (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
                self.status = ConnectionStatus::Error(format!("{e}"));
                return;
            }
        };

        let (health, sectors, industries) = tokio::join!(
            health_res.json::<HealthResponse>(),
            sectors_res.json::<Vec<PerformanceResponse>>(),
            industries_res.json::<Vec<PerformanceResponse>>(),
        );

        match (health, sectors, industries) {
            (Ok(h), Ok(s), Ok(i)) => {
                self.health = h;
                self.sectors = s;
                self.industries = i;
                self.status = ConnectionStatus::Connected;
                self.last_refresh = std::time::Instant::now();

                if let Ok(l) = latency_res {
                    if let Ok(latency) = l.json::<LatencyResponse>().await {
                        self.latency = latency;
                    }
                }
            }
            (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
                self.status = ConnectionStatus::Error(format!("parse error: {e}"));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

pub fn format_pct(v: f64) -> String {
    format!("{v:+.2}%")
}

pub fn format_ms(ms: Option<f64>) -> String {
    match ms {
        Some(d) if d >= 1000.0 => format!("{:.1}s", d / 1000.0),
        Some(d) => format!("{d:.1}ms"),
        None => "—".to_string(),
    }
}

/// Uptime as `1d 02h 03m`, dropping leading zero units.
pub fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs / 3600) % 24;
    let mins = (secs / 60) % 60;
    match (days, hours) {
        (0, 0) => format!("{mins}m"),
        (0, h) => format!("{h}h {mins:02}m"),
        (d, h) => format!("{d}d {h:02}h {mins:02}m"),
    }
}

/// Truncate to `max` characters, marking the cut with an ellipsis.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}
