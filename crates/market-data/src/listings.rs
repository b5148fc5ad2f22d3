use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use screener_core::{ListingSource, SourceError};
use std::sync::Arc;
use std::time::Duration;

pub const NASDAQ_LISTED_URL: &str = "https://www.nasdaqtrader.com/dynamic/SymDir/nasdaqlisted.txt";
pub const SP400_URL: &str = "https://en.wikipedia.org/wiki/List_of_S%26P_400_companies";
pub const SP600_URL: &str = "https://en.wikipedia.org/wiki/List_of_S%26P_600_companies";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The listing sources of a scheduled scan: NASDAQ, S&P 400 and S&P 600.
pub fn default_sources() -> Vec<Arc<dyn ListingSource>> {
    vec![
        Arc::new(NasdaqListedSource::new()),
        Arc::new(IndexMembershipSource::sp400()),
        Arc::new(IndexMembershipSource::sp600()),
    ]
}

async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String, SourceError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| SourceError::Http(e.to_string()))?;

    if !response.status().is_success() {
        return Err(SourceError::Http(format!("HTTP {} from {}", response.status(), url)));
    }

    response.text().await.map_err(|e| SourceError::Http(e.to_string()))
}

/// Symbols of the pipe-delimited NASDAQ directory, test issues excluded.
///
/// The trailing "File Creation Time" line has no `Test Issue` value and is
/// skipped like any other non-`N` row.
pub fn parse_nasdaq_listed(body: &str) -> Result<Vec<String>, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'|')
        .flexible(true)
        .from_reader(body.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| SourceError::Parse(e.to_string()))?
        .clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| SourceError::MissingColumn(name.to_string()))
    };
    let symbol_col = column("Symbol")?;
    let test_col = column("Test Issue")?;

    let mut symbols = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| SourceError::Parse(e.to_string()))?;
        if record.get(test_col).map(str::trim) != Some("N") {
            continue;
        }
        if let Some(symbol) = record.get(symbol_col).map(str::trim).filter(|s| !s.is_empty()) {
            symbols.push(symbol.to_string());
        }
    }

    Ok(symbols)
}

fn selector(css: &str) -> Result<Selector, SourceError> {
    Selector::parse(css).map_err(|e| SourceError::Parse(e.to_string()))
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// Symbols from the first HTML table whose header row names a `Symbol` or
/// `Ticker` column.
pub fn parse_index_table(html: &str) -> Result<Vec<String>, SourceError> {
    let document = Html::parse_document(html);
    let tables = selector("table")?;
    let rows = selector("tr")?;
    let cells = selector("th, td")?;

    for table in document.select(&tables) {
        let mut table_rows = table.select(&rows);
        let Some(header) = table_rows.next() else {
            continue;
        };

        let Some(col) = header
            .select(&cells)
            .map(cell_text)
            .position(|h| h.contains("Symbol") || h.contains("Ticker"))
        else {
            continue;
        };

        return Ok(table_rows
            .filter_map(|row| row.select(&cells).nth(col).map(cell_text))
            .filter(|s| !s.is_empty())
            .collect());
    }

    Err(SourceError::MissingColumn("Symbol".to_string()))
}

/// NASDAQ listed-securities directory.
pub struct NasdaqListedSource {
    client: reqwest::Client,
    url: String,
}

impl NasdaqListedSource {
    pub fn new() -> Self {
        Self::with_url(NASDAQ_LISTED_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            client: crate::http_client(REQUEST_TIMEOUT),
            url: url.into(),
        }
    }
}

impl Default for NasdaqListedSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ListingSource for NasdaqListedSource {
    fn id(&self) -> &str {
        "nasdaq"
    }

    async fn list_symbols(&self) -> Result<Vec<String>, SourceError> {
        let body = fetch_text(&self.client, &self.url).await?;
        parse_nasdaq_listed(&body)
    }
}

/// Constituents of an index, scraped from its membership page.
pub struct IndexMembershipSource {
    id: String,
    client: reqwest::Client,
    url: String,
}

impl IndexMembershipSource {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            client: crate::http_client(REQUEST_TIMEOUT),
            url: url.into(),
        }
    }

    pub fn sp400() -> Self {
        Self::new("sp400", SP400_URL)
    }

    pub fn sp600() -> Self {
        Self::new("sp600", SP600_URL)
    }
}

#[async_trait]
impl ListingSource for IndexMembershipSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn list_symbols(&self) -> Result<Vec<String>, SourceError> {
        let body = fetch_text(&self.client, &self.url).await?;
        parse_index_table(&body)
    }
}
