use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{Stock, Ticker};

/// Stocks grouped by sector, then industry. Largest groups first.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Summary {
    pub size: usize,
    pub sectors: Vec<SummarySector>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SummarySector {
    pub name: String,
    pub url: String,
    pub size: usize,
    pub industries: Vec<SummaryIndustry>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SummaryIndustry {
    pub name: String,
    pub url: String,
    pub size: usize,
    pub tickers: Vec<Ticker>,
}

impl Summary {
    pub fn summarize(stocks: impl IntoIterator<Item = Stock>) -> Summary {
        let mut by_sector: BTreeMap<String, BTreeMap<String, Vec<Stock>>> = BTreeMap::new();
        for stock in stocks {
            by_sector
                .entry(stock.sector.name.clone())
                .or_default()
                .entry(stock.industry.name.clone())
                .or_default()
                .push(stock);
        }

        let mut sectors: Vec<SummarySector> = by_sector
            .into_iter()
            .map(|(sector_name, industries)| {
                let sector_url = industries
                    .values()
                    .flatten()
                    .next()
                    .map(|s| s.sector.url.clone())
                    .unwrap_or_default();

                let mut industries: Vec<SummaryIndustry> = industries
                    .into_iter()
                    .map(|(industry_name, mut stocks)| {
                        stocks.sort_by(|a, b| a.ticker.cmp(&b.ticker));
                        SummaryIndustry {
                            name: industry_name,
                            url: stocks[0].industry.url.clone(),
                            size: stocks.len(),
                            tickers: stocks
                                .into_iter()
                                .map(|s| Ticker {
                                    exchange: s.exchange,
                                    ticker: s.ticker,
                                })
                                .collect(),
                        }
                    })
                    .collect();
                // stable sort keeps name order among equal sizes
                industries.sort_by(|a, b| b.size.cmp(&a.size));

                SummarySector {
                    name: sector_name,
                    url: sector_url,
                    size: industries.iter().map(|i| i.size).sum(),
                    industries,
                }
            })
            .collect();
        sectors.sort_by(|a, b| b.size.cmp(&a.size));

        Summary {
            size: sectors.iter().map(|s| s.size).sum(),
            sectors,
        }
    }
}
