//! Closing prices from a wide CSV file.
//!
//! Layout: the first column is the date (`YYYY-MM-DD`), every other column is a
//! ticker. Empty cells are treated as missing prices.
//!
//! ```text
//! date,BBCA.JK,ADRO.JK
//! 2022-01-03,7325,2250
//! 2022-01-04,7350,
//! ```

use chrono::NaiveDate;
use std::path::{Path, PathBuf};

use super::{DataError, PriceTable, StatisticsProvider};

#[derive(Debug, Clone)]
pub struct CsvPriceProvider {
    path: PathBuf,
}

impl CsvPriceProvider {
    pub fn new(path: impl AsRef<Path>) -> Self {
        CsvPriceProvider {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StatisticsProvider for CsvPriceProvider {
    async fn fetch_prices(
        &self,
        tickers: &[String],
        start_date: NaiveDate,
    ) -> Result<PriceTable, DataError> {
        let file =
            std::fs::File::open(self.path()).map_err(|source| DataError::PriceFile {
                path: self.path().to_path_buf(),
                source,
            })?;
        read_price_table(file, tickers, start_date)
    }
}

pub fn read_price_table<R: std::io::Read>(
    source: R,
    tickers: &[String],
    start_date: NaiveDate,
) -> Result<PriceTable, DataError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(source);
    let headers = reader.headers()?.clone();

    // column index for every requested ticker, date is always column 0
    let columns = tickers
        .iter()
        .map(|ticker| {
            headers
                .iter()
                .skip(1)
                .position(|header| header == ticker)
                .map(|position| position + 1)
                .ok_or_else(|| DataError::MissingTicker(ticker.clone()))
        })
        .collect::<Result<Vec<usize>, DataError>>()?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let raw_date = record.get(0).unwrap_or_default();
        let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d")
            .map_err(|_| DataError::InvalidDate(raw_date.to_string()))?;
        if date < start_date {
            continue;
        }

        let prices = columns
            .iter()
            .zip(tickers.iter())
            .map(|(&column, ticker)| match record.get(column) {
                None | Some("") => Ok(None),
                Some(raw) => raw
                    .parse::<f64>()
                    .map(Some)
                    .map_err(|_| DataError::InvalidPrice {
                        ticker: ticker.clone(),
                        date,
                        value: raw.to_string(),
                    }),
            })
            .collect::<Result<Vec<Option<f64>>, DataError>>()?;
        rows.push((date, prices));
    }

    PriceTable::new(tickers.to_vec(), rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PRICES: &str = "\
date,AAA,BBB,CCC
2021-12-30,90,10,1
2022-01-03,100,20,1
2022-01-04,110,,1
2022-01-05,121,22,1
";

    fn tickers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 1, 1).unwrap()
    }

    #[test]
    fn test_reads_requested_columns_from_start_date() {
        let table =
            read_price_table(PRICES.as_bytes(), &tickers(&["BBB", "AAA"]), start()).unwrap();

        assert_eq!(table.tickers(), &tickers(&["BBB", "AAA"])[..]);
        assert_eq!(table.len(), 3, "row before the start date must be skipped");
        assert_eq!(
            table.complete_rows(),
            vec![vec![20.0, 100.0], vec![22.0, 121.0]]
        );
    }

    #[test]
    fn test_missing_ticker_column_is_an_error() {
        let result = read_price_table(PRICES.as_bytes(), &tickers(&["AAA", "ZZZ"]), start());
        assert!(matches!(result, Err(DataError::MissingTicker(t)) if t == "ZZZ"));
    }

    #[test]
    fn test_bad_cells_are_reported() {
        let bad_date = "date,AAA\n03/01/2022,1\n";
        assert!(matches!(
            read_price_table(bad_date.as_bytes(), &tickers(&["AAA"]), start()),
            Err(DataError::InvalidDate(_))
        ));

        let bad_price = "date,AAA\n2022-01-03,abc\n";
        assert!(matches!(
            read_price_table(bad_price.as_bytes(), &tickers(&["AAA"]), start()),
            Err(DataError::InvalidPrice { .. })
        ));
    }

    #[tokio::test]
    async fn test_provider_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(PRICES.as_bytes()).unwrap();

        let provider = CsvPriceProvider::new(file.path());
        let table = provider
            .fetch_prices(&tickers(&["AAA", "CCC"]), start())
            .await
            .unwrap();
        assert_eq!(table.complete_rows().len(), 3);

        // two return observations is the minimum for a covariance
        let stats = provider
            .statistics(&tickers(&["AAA", "CCC"]), start())
            .await
            .unwrap();
        assert_eq!(stats.asset_count(), 2);
        assert_eq!(stats.covariance()[(1, 1)], 0.0);
    }

    #[tokio::test]
    async fn test_missing_file_names_the_path() {
        let provider = CsvPriceProvider::new("/definitely/not/here.csv");
        let error = provider
            .fetch_prices(&tickers(&["AAA"]), start())
            .await
            .unwrap_err();
        assert!(matches!(&error, DataError::PriceFile { path, .. } if path == provider.path()));
        assert_eq!(
            error.to_string(),
            "failed to read price file /definitely/not/here.csv"
        );
    }

    #[tokio::test]
    async fn test_start_date_after_every_row_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(PRICES.as_bytes()).unwrap();

        let provider = CsvPriceProvider::new(file.path());
        let late = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let error = provider
            .statistics(&tickers(&["AAA"]), late)
            .await
            .unwrap_err();
        assert!(matches!(error, DataError::NoPricesSince(date) if date == late));
    }
}
