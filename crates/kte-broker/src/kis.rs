//! The KIS (Korea Investment & Securities) Open API adapter. PAPER and REAL
//! are the same wire protocol against different base URLs and TR IDs
//! (grounded on `original_source/kis_trend_atr_trading/api/kis_api.py` and
//! `config/settings_base.py`); the client never upgrades PAPER to REAL.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use kte_domain::{Bar, Money, Side, Symbol};
use serde::Deserialize;

use crate::error::BrokerError;
use crate::network_health::{HealthTransition, NetworkHealth};
use crate::rate_limiter::RateLimiter;
use crate::retry::with_retry;
use crate::token::TokenCache;
use crate::types::*;
use crate::BrokerClient;

const PAPER_BASE_URL: &str = "https://openapivts.koreainvestment.com:29443";
const REAL_BASE_URL: &str = "https://openapi.koreainvestment.com:9443";

const TR_BUY_PAPER: &str = "VTTC0802U";
const TR_SELL_PAPER: &str = "VTTC0801U";
const TR_BUY_REAL: &str = "TTTC0802U";
const TR_SELL_REAL: &str = "TTTC0801U";
const TR_ORDER_STATUS_PAPER: &str = "VTTC8001R";
const TR_ORDER_STATUS_REAL: &str = "TTTC8001R";
const TR_CANCEL_PAPER: &str = "VTTC0803U";
const TR_CANCEL_REAL: &str = "TTTC0803U";
const TR_BALANCE_PAPER: &str = "VTTC8434R";
const TR_BALANCE_REAL: &str = "TTTC8434R";
const TR_CURRENT_PRICE: &str = "FHKST01010100";
const TR_DAILY_OHLCV: &str = "FHKST03010100";

const OHLCV_PAGE_SIZE: usize = 100;

pub struct KisBrokerClient {
    http: reqwest::Client,
    base_url: String,
    mode: Mode,
    app_key: String,
    app_secret: String,
    rate_limiter: RateLimiter,
    tokens: TokenCache,
    network: NetworkHealth,
}

impl KisBrokerClient {
    pub fn new(mode: Mode, app_key: String, app_secret: String, requests_per_second: f64) -> Self {
        let base_url = match mode {
            Mode::Paper => PAPER_BASE_URL,
            Mode::Real => REAL_BASE_URL,
        }
        .to_string();
        KisBrokerClient {
            http: reqwest::Client::new(),
            base_url,
            mode,
            app_key,
            app_secret,
            rate_limiter: RateLimiter::new(requests_per_second),
            tokens: TokenCache::new(),
            network: NetworkHealth::new(),
        }
    }

    fn tr_id(&self, real: &'static str, paper: &'static str) -> &'static str {
        match self.mode {
            Mode::Real => real,
            Mode::Paper => paper,
        }
    }

    async fn auth_headers(&self, tr_id: &str) -> Result<Vec<(String, String)>, BrokerError> {
        let token = self
            .tokens
            .get_or_refresh(|| self.fetch_access_token())
            .await?;
        Ok(vec![
            ("authorization".to_string(), format!("Bearer {}", token.token)),
            ("appkey".to_string(), self.app_key.clone()),
            ("appsecret".to_string(), self.app_secret.clone()),
            ("tr_id".to_string(), tr_id.to_string()),
        ])
    }

    async fn fetch_access_token(&self) -> Result<AccessToken, BrokerError> {
        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: i64,
        }

        let url = format!("{}/oauth2/tokenP", self.base_url);
        let body = serde_json::json!({
            "grant_type": "client_credentials",
            "appkey": self.app_key,
            "appsecret": self.app_secret,
        });

        self.rate_limiter.acquire().await;
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(BrokerError::Auth("token request rejected".to_string()));
        }
        if !resp.status().is_success() {
            return Err(classify_status(resp.status()));
        }

        let parsed: TokenResponse = resp
            .json()
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))?;

        Ok(AccessToken {
            token: parsed.access_token,
            expires_at: chrono::Utc::now() + chrono::Duration::seconds(parsed.expires_in),
        })
    }

    fn note_outcome(&self, result: &Result<impl Sized, BrokerError>) {
        match result {
            Ok(_) => {
                if self.network.record_success() == HealthTransition::Recovered {
                    tracing::info!("network recovered, transport errors cleared");
                }
            }
            Err(err) if err.is_retryable() => {
                if self.network.record_failure() == HealthTransition::BecameUnavailable {
                    tracing::error!("network unavailable for 60s continuously");
                }
            }
            Err(_) => {}
        }
    }
}

fn classify_status(status: reqwest::StatusCode) -> BrokerError {
    if status.is_client_error() {
        BrokerError::Reject(format!("http {status}"))
    } else {
        BrokerError::Transport(format!("http {status}"))
    }
}

#[async_trait]
impl BrokerClient for KisBrokerClient {
    async fn get_access_token(&self) -> Result<AccessToken, BrokerError> {
        let result = with_retry(|| self.fetch_access_token()).await;
        self.note_outcome(&result);
        result
    }

    async fn get_daily_ohlcv(
        &self,
        symbol: &Symbol,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<Bar>, BrokerError> {
        let tr_id = TR_DAILY_OHLCV;
        let mut all_bars: Vec<Bar> = Vec::new();
        let mut cursor_to = to;

        loop {
            let headers = self.auth_headers(tr_id).await?;
            let url = format!(
                "{}/uapi/domestic-stock/v1/quotations/inquire-daily-itemchartprice",
                self.base_url
            );
            let symbol = symbol.clone();
            let result = with_retry(|| {
                let url = url.clone();
                let headers = headers.clone();
                async move {
                    self.rate_limiter.acquire().await;
                    let mut req = self.http.get(&url).query(&[
                        ("FID_COND_MRKT_DIV_CODE", "J".to_string()),
                        ("FID_INPUT_ISCD", symbol.as_str().to_string()),
                        ("FID_PERIOD_DIV_CODE", "D".to_string()),
                        ("FID_ORG_ADJ_PRC", "0".to_string()),
                    ]);
                    if let Some(f) = from {
                        req = req.query(&[("FID_INPUT_DATE_1", f.format("%Y%m%d").to_string())]);
                    }
                    if let Some(t) = cursor_to {
                        req = req.query(&[("FID_INPUT_DATE_2", t.format("%Y%m%d").to_string())]);
                    }
                    for (k, v) in &headers {
                        req = req.header(k, v);
                    }
                    let resp = req.send().await.map_err(|e| BrokerError::Transport(e.to_string()))?;
                    if !resp.status().is_success() {
                        return Err(classify_status(resp.status()));
                    }
                    resp.json::<KisOhlcvResponse>()
                        .await
                        .map_err(|e| BrokerError::Transport(e.to_string()))
                }
            })
            .await;
            self.note_outcome(&result);
            let page = result?;

            let page_bars: Vec<Bar> = page
                .output2
                .iter()
                .filter_map(|row| row.to_bar().ok())
                .collect();
            let page_len = page_bars.len();
            all_bars.extend(page_bars);

            if page_len < OHLCV_PAGE_SIZE {
                break;
            }
            cursor_to = all_bars.iter().map(|b| b.date).min();
            if cursor_to.is_none() {
                break;
            }
        }

        all_bars.sort_by_key(|b| b.date);
        all_bars.dedup_by_key(|b| b.date);
        Ok(all_bars)
    }

    async fn get_current_price(&self, symbol: &Symbol) -> Result<CurrentPrice, BrokerError> {
        let headers = self.auth_headers(TR_CURRENT_PRICE).await?;
        let url = format!(
            "{}/uapi/domestic-stock/v1/quotations/inquire-price",
            self.base_url
        );
        let result = with_retry(|| async {
            self.rate_limiter.acquire().await;
            let resp = self
                .http
                .get(&url)
                .query(&[
                    ("FID_COND_MRKT_DIV_CODE", "J"),
                    ("FID_INPUT_ISCD", symbol.as_str()),
                ])
                .headers(to_header_map(&headers))
                .send()
                .await
                .map_err(|e| BrokerError::Transport(e.to_string()))?;
            if !resp.status().is_success() {
                return Err(classify_status(resp.status()));
            }
            resp.json::<KisCurrentPriceResponse>()
                .await
                .map_err(|e| BrokerError::Transport(e.to_string()))
        })
        .await;
        self.note_outcome(&result);
        result.map(|r| r.output.into())
    }

    async fn place_order(&self, req: PlaceOrderRequest) -> Result<PlaceOrderResponse, BrokerError> {
        let tr_id = match req.side {
            Side::Buy => self.tr_id(TR_BUY_REAL, TR_BUY_PAPER),
            Side::Sell => self.tr_id(TR_SELL_REAL, TR_SELL_PAPER),
        };
        let headers = self.auth_headers(tr_id).await?;
        let url = format!("{}/uapi/domestic-stock/v1/trading/order-cash", self.base_url);
        let order_type_code = match req.order_type {
            OrderType::Market => "01",
            OrderType::Limit => "00",
        };
        let body = serde_json::json!({
            "PDNO": req.symbol.as_str(),
            "ORD_DVSN": order_type_code,
            "ORD_QTY": req.quantity.to_string(),
            "ORD_UNPR": req.price.minor().to_string(),
        });

        let result: Result<KisOrderResponse, BrokerError> = with_retry(|| {
            let body = body.clone();
            async {
                self.rate_limiter.acquire().await;
                let resp = self
                    .http
                    .post(&url)
                    .headers(to_header_map(&headers))
                    .json(&body)
                    .send()
                    .await
                    .map_err(|e| BrokerError::Transport(e.to_string()))?;
                if !resp.status().is_success() {
                    return Err(classify_status(resp.status()));
                }
                resp.json::<KisOrderResponse>()
                    .await
                    .map_err(|e| BrokerError::Transport(e.to_string()))
            }
        })
        .await;
        self.note_outcome(&result);
        let parsed = result?;
        if parsed.rt_cd != "0" {
            return Err(BrokerError::Reject(parsed.msg1));
        }
        Ok(PlaceOrderResponse {
            order_no: parsed.output.odno,
        })
    }

    async fn cancel_order(&self, order_no: &str) -> Result<(), BrokerError> {
        let tr_id = self.tr_id(TR_CANCEL_REAL, TR_CANCEL_PAPER);
        let headers = self.auth_headers(tr_id).await?;
        let url = format!(
            "{}/uapi/domestic-stock/v1/trading/order-rvsecncl",
            self.base_url
        );
        let body = serde_json::json!({ "ORGN_ODNO": order_no, "RVSE_CNCL_DVSN_CD": "02" });

        let result = with_retry(|| {
            let body = body.clone();
            async {
                self.rate_limiter.acquire().await;
                let resp = self
                    .http
                    .post(&url)
                    .headers(to_header_map(&headers))
                    .json(&body)
                    .send()
                    .await
                    .map_err(|e| BrokerError::Transport(e.to_string()))?;
                if !resp.status().is_success() {
                    return Err(classify_status(resp.status()));
                }
                Ok(())
            }
        })
        .await;
        self.note_outcome(&result);
        result
    }

    async fn get_order_status(&self, order_no: Option<&str>) -> Result<Vec<ExecutedOrder>, BrokerError> {
        let tr_id = self.tr_id(TR_ORDER_STATUS_REAL, TR_ORDER_STATUS_PAPER);
        let headers = self.auth_headers(tr_id).await?;
        let url = format!(
            "{}/uapi/domestic-stock/v1/trading/inquire-daily-ccld",
            self.base_url
        );
        let result = with_retry(|| async {
            self.rate_limiter.acquire().await;
            let resp = self
                .http
                .get(&url)
                .headers(to_header_map(&headers))
                .send()
                .await
                .map_err(|e| BrokerError::Transport(e.to_string()))?;
            if !resp.status().is_success() {
                return Err(classify_status(resp.status()));
            }
            resp.json::<KisOrderStatusResponse>()
                .await
                .map_err(|e| BrokerError::Transport(e.to_string()))
        })
        .await;
        self.note_outcome(&result);
        let parsed = result?;
        let mut rows: Vec<ExecutedOrder> = parsed.output1.iter().map(|r| r.into()).collect();
        if let Some(order_no) = order_no {
            rows.retain(|r| r.order_no == order_no);
        }
        Ok(rows)
    }

    async fn wait_for_execution(
        &self,
        order_no: &str,
        expected_qty: u64,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<WaitForExecutionResult, BrokerError> {
        crate::poll_until_filled_or_timeout(self, order_no, expected_qty, timeout, poll_interval).await
    }

    async fn get_account_balance(&self) -> Result<AccountBalance, BrokerError> {
        let tr_id = self.tr_id(TR_BALANCE_REAL, TR_BALANCE_PAPER);
        let headers = self.auth_headers(tr_id).await?;
        let url = format!(
            "{}/uapi/domestic-stock/v1/trading/inquire-balance",
            self.base_url
        );
        let result = with_retry(|| async {
            self.rate_limiter.acquire().await;
            let resp = self
                .http
                .get(&url)
                .headers(to_header_map(&headers))
                .send()
                .await
                .map_err(|e| BrokerError::Transport(e.to_string()))?;
            if !resp.status().is_success() {
                return Err(classify_status(resp.status()));
            }
            resp.json::<KisBalanceResponse>()
                .await
                .map_err(|e| BrokerError::Transport(e.to_string()))
        })
        .await;
        self.note_outcome(&result);
        result.map(Into::into)
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn network_unavailable(&self) -> bool {
        self.network.is_unavailable()
    }
}

fn to_header_map(pairs: &[(String, String)]) -> reqwest::header::HeaderMap {
    let mut map = reqwest::header::HeaderMap::new();
    for (k, v) in pairs {
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::from_bytes(k.as_bytes()),
            reqwest::header::HeaderValue::from_str(v),
        ) {
            map.insert(name, value);
        }
    }
    map
}

// --- KIS wire-format response DTOs, mapped into the broker-agnostic types above. ---

#[derive(Deserialize)]
struct KisOhlcvRow {
    stck_bsop_date: String,
    stck_oprc: String,
    stck_hgpr: String,
    stck_lwpr: String,
    stck_clpr: String,
    acml_vol: String,
}

impl KisOhlcvRow {
    fn to_bar(&self) -> Result<Bar, ()> {
        let date = NaiveDate::parse_from_str(&self.stck_bsop_date, "%Y%m%d").map_err(|_| ())?;
        Ok(Bar {
            date,
            open: Money::from_f64_quantized(self.stck_oprc.parse().map_err(|_| ())?),
            high: Money::from_f64_quantized(self.stck_hgpr.parse().map_err(|_| ())?),
            low: Money::from_f64_quantized(self.stck_lwpr.parse().map_err(|_| ())?),
            close: Money::from_f64_quantized(self.stck_clpr.parse().map_err(|_| ())?),
            volume: self.acml_vol.parse().unwrap_or(0),
        })
    }
}

#[derive(Deserialize)]
struct KisOhlcvResponse {
    output2: Vec<KisOhlcvRow>,
}

#[derive(Deserialize)]
struct KisCurrentPriceRow {
    stck_prpr: String,
    stck_oprc: String,
    stck_hgpr: String,
    stck_lwpr: String,
    acml_vol: String,
    prdy_ctrt: String,
}

impl From<KisCurrentPriceRow> for CurrentPrice {
    fn from(row: KisCurrentPriceRow) -> Self {
        CurrentPrice {
            price: Money::from_f64_quantized(row.stck_prpr.parse().unwrap_or(0.0)),
            open: Money::from_f64_quantized(row.stck_oprc.parse().unwrap_or(0.0)),
            high: Money::from_f64_quantized(row.stck_hgpr.parse().unwrap_or(0.0)),
            low: Money::from_f64_quantized(row.stck_lwpr.parse().unwrap_or(0.0)),
            volume: row.acml_vol.parse().unwrap_or(0),
            change_rate: row.prdy_ctrt.parse().unwrap_or(0.0),
        }
    }
}

#[derive(Deserialize)]
struct KisCurrentPriceResponse {
    output: KisCurrentPriceRow,
}

#[derive(Deserialize)]
struct KisOrderOutput {
    #[serde(rename = "ODNO")]
    odno: String,
}

#[derive(Deserialize)]
struct KisOrderResponse {
    rt_cd: String,
    msg1: String,
    output: KisOrderOutput,
}

#[derive(Deserialize)]
struct KisOrderStatusRow {
    odno: String,
    sll_buy_dvsn_cd: String,
    ord_qty: String,
    tot_ccld_qty: String,
    avg_prvs: String,
    rmn_qty: String,
}

impl From<&KisOrderStatusRow> for ExecutedOrder {
    fn from(row: &KisOrderStatusRow) -> Self {
        let ordered_qty: u64 = row.ord_qty.parse().unwrap_or(0);
        let filled_qty: u64 = row.tot_ccld_qty.parse().unwrap_or(0);
        let remaining_qty: u64 = row.rmn_qty.parse().unwrap_or(0);
        let status = if remaining_qty == 0 && filled_qty > 0 {
            OrderExecutionStatus::Filled
        } else if filled_qty > 0 {
            OrderExecutionStatus::PartiallyFilled
        } else {
            OrderExecutionStatus::Open
        };
        ExecutedOrder {
            order_no: row.odno.clone(),
            side: if row.sll_buy_dvsn_cd == "02" { Side::Buy } else { Side::Sell },
            ordered_qty,
            filled_qty,
            avg_price: Money::from_f64_quantized(row.avg_prvs.parse().unwrap_or(0.0)),
            remaining_qty,
            status,
        }
    }
}

#[derive(Deserialize)]
struct KisOrderStatusResponse {
    output1: Vec<KisOrderStatusRow>,
}

#[derive(Deserialize)]
struct KisHoldingRow {
    pdno: String,
    hldg_qty: String,
    pchs_avg_pric: String,
    prpr: String,
    evlu_pfls_amt: String,
}

#[derive(Deserialize)]
struct KisBalanceOutput2 {
    dnca_tot_amt: String,
    tot_evlu_amt: String,
    evlu_pfls_smtl_amt: String,
}

#[derive(Deserialize)]
struct KisBalanceResponse {
    output1: Vec<KisHoldingRow>,
    output2: Vec<KisBalanceOutput2>,
}

impl From<KisBalanceResponse> for AccountBalance {
    fn from(resp: KisBalanceResponse) -> Self {
        let summary = resp.output2.into_iter().next();
        let holdings = resp
            .output1
            .into_iter()
            .filter_map(|row| {
                let qty: u64 = row.hldg_qty.parse().ok()?;
                if qty == 0 {
                    return None;
                }
                Some(Holding {
                    symbol: Symbol::new(&row.pdno),
                    quantity: qty,
                    avg_price: Money::from_f64_quantized(row.pchs_avg_pric.parse().unwrap_or(0.0)),
                    current_price: Money::from_f64_quantized(row.prpr.parse().unwrap_or(0.0)),
                    pnl: Money::from_f64_quantized(row.evlu_pfls_amt.parse().unwrap_or(0.0)),
                })
            })
            .collect();
        match summary {
            Some(s) => AccountBalance {
                holdings,
                cash: Money::from_f64_quantized(s.dnca_tot_amt.parse().unwrap_or(0.0)),
                total_equity: Money::from_f64_quantized(s.tot_evlu_amt.parse().unwrap_or(0.0)),
                total_pnl: Money::from_f64_quantized(s.evlu_pfls_smtl_amt.parse().unwrap_or(0.0)),
            },
            None => AccountBalance {
                holdings,
                cash: Money::ZERO,
                total_equity: Money::ZERO,
                total_pnl: Money::ZERO,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_matches_mode() {
        let paper = KisBrokerClient::new(Mode::Paper, "k".into(), "s".into(), 20.0);
        assert_eq!(paper.base_url, PAPER_BASE_URL);
        let real = KisBrokerClient::new(Mode::Real, "k".into(), "s".into(), 20.0);
        assert_eq!(real.base_url, REAL_BASE_URL);
    }

    #[test]
    fn tr_id_selection_never_crosses_modes() {
        let paper = KisBrokerClient::new(Mode::Paper, "k".into(), "s".into(), 20.0);
        assert_eq!(paper.tr_id(TR_BUY_REAL, TR_BUY_PAPER), TR_BUY_PAPER);
        let real = KisBrokerClient::new(Mode::Real, "k".into(), "s".into(), 20.0);
        assert_eq!(real.tr_id(TR_BUY_REAL, TR_BUY_PAPER), TR_BUY_REAL);
    }

    #[test]
    fn classify_status_separates_reject_from_transport() {
        assert!(matches!(
            classify_status(reqwest::StatusCode::BAD_REQUEST),
            BrokerError::Reject(_)
        ));
        assert!(matches!(
            classify_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR),
            BrokerError::Transport(_)
        ));
    }

    #[test]
    fn ohlcv_row_parses_yyyymmdd_date() {
        let row = KisOhlcvRow {
            stck_bsop_date: "20260115".to_string(),
            stck_oprc: "70000".to_string(),
            stck_hgpr: "71000".to_string(),
            stck_lwpr: "69500".to_string(),
            stck_clpr: "70500".to_string(),
            acml_vol: "1234567".to_string(),
        };
        let bar = row.to_bar().unwrap();
        assert_eq!(bar.date, NaiveDate::from_ymd_opt(2026, 1, 15).unwrap());
        assert_eq!(bar.volume, 1_234_567);
    }
}
