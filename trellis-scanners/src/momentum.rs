//! Built-in momentum scanner.
//!
//! Screens the day's most active symbols for price range, volume, dollar
//! volume, and gap-up percentage. The screening itself is delegated to the
//! [`MarketScreen`] collaborator; this module only applies the configured
//! thresholds.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use tracing::debug;

use trellis_broker::{MarketScreen, SymbolSnapshot};
use trellis_config::ScannerSpec;
use trellis_core::Symbol;

use crate::{ScanResult, Scanner, ScannerError, ScannerFactory};

/// Thresholds applied to the most-active snapshot list. Missing required
/// keys are a fatal configuration error, mirroring the strictness of the
/// session's pre-spawn validation.
#[derive(Clone, Debug, Deserialize)]
pub struct MomentumParams {
    pub min_share_price: f64,
    pub max_share_price: f64,
    pub min_volume: f64,
    pub min_last_dollar_volume: f64,
    pub today_change_percent: f64,
    #[serde(default = "default_max_symbols")]
    pub max_symbols: usize,
}

fn default_max_symbols() -> usize {
    440
}

pub struct MomentumScanner {
    params: MomentumParams,
    recurrence: bool,
    screen: Arc<dyn MarketScreen>,
}

impl MomentumScanner {
    pub fn new(params: MomentumParams, recurrence: bool, screen: Arc<dyn MarketScreen>) -> Self {
        Self {
            params,
            recurrence,
            screen,
        }
    }

    fn passes(&self, snapshot: &SymbolSnapshot) -> bool {
        let price = snapshot.last_price.to_f64().unwrap_or(0.0);
        let volume = snapshot.day_volume.to_f64().unwrap_or(0.0);
        let dollar_volume = snapshot.prev_day_dollar_volume.to_f64().unwrap_or(0.0);
        let change = snapshot.today_change_percent.to_f64().unwrap_or(0.0);
        price >= self.params.min_share_price
            && price <= self.params.max_share_price
            && volume >= self.params.min_volume
            && dollar_volume >= self.params.min_last_dollar_volume
            && change >= self.params.today_change_percent
    }
}

#[async_trait]
impl Scanner for MomentumScanner {
    fn name(&self) -> &str {
        "momentum"
    }

    fn recurrence(&self) -> bool {
        self.recurrence
    }

    async fn run(&self) -> ScanResult<Vec<Symbol>> {
        let snapshots = self.screen.most_active(self.params.max_symbols).await?;
        let mut selected = Vec::new();
        for snapshot in snapshots {
            if self.passes(&snapshot) {
                selected.push(snapshot.symbol);
            } else {
                debug!(symbol = %snapshot.symbol, "momentum scanner filtered symbol");
            }
            if selected.len() >= self.params.max_symbols {
                break;
            }
        }
        Ok(selected)
    }
}

pub(crate) struct MomentumFactory;

impl ScannerFactory for MomentumFactory {
    fn name(&self) -> &str {
        "momentum"
    }

    fn build(
        &self,
        spec: &ScannerSpec,
        screen: Arc<dyn MarketScreen>,
    ) -> ScanResult<Box<dyn Scanner>> {
        let params: MomentumParams =
            serde_json::from_value(spec.params.clone()).map_err(|err| {
                ScannerError::InvalidParams {
                    name: spec.name.clone(),
                    reason: err.to_string(),
                }
            })?;
        if params.min_share_price > params.max_share_price {
            return Err(ScannerError::InvalidParams {
                name: spec.name.clone(),
                reason: "min_share_price exceeds max_share_price".into(),
            });
        }
        Ok(Box::new(MomentumScanner::new(
            params,
            spec.recurrence,
            screen,
        )))
    }
}
