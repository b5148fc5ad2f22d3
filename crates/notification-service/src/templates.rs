use crate::{Alert, AlertType};

pub struct EmailTemplate;

fn ticker_list(tickers: &str) -> &str {
    if tickers.is_empty() {
        "none found"
    } else {
        tickers
    }
}

impl EmailTemplate {
    /// Plain-text body shared by the e-mail and Discord channels.
    pub fn render(alert: &Alert) -> String {
        let body = match &alert.alert_type {
            AlertType::ScanCompleted {
                superstocks,
                watchlist,
                superstock_count,
                watchlist_count,
                lots_skipped,
                symbols_skipped,
                elapsed_minutes,
            } => {
                let mut body = format!(
                    "SUPERSTOCKS ({superstock_count})\n{}\n\nWATCHLIST ({watchlist_count})\n{}\n",
                    ticker_list(superstocks),
                    ticker_list(watchlist),
                );
                if *lots_skipped > 0 || *symbols_skipped > 0 {
                    body.push_str(&format!(
                        "\nSkipped: {lots_skipped} lots, {symbols_skipped} symbols without usable data\n"
                    ));
                }
                body.push_str(&format!("Run time: {elapsed_minutes:.1} minutes\n"));
                body
            }
            AlertType::ScanFailed { reason } => format!("The scan did not complete.\n\n{reason}\n"),
        };

        format!(
            "{}\n\n{}\nSent at {} UTC\n",
            alert.message,
            body,
            alert.timestamp.format("%Y-%m-%d %H:%M:%S"),
        )
    }
}
