pub mod adx;
pub mod atr;
pub mod cross;
pub mod ema;
pub mod snapshot;
pub mod volume;

pub use adx::{calculate_adx, AdxOutput};
pub use atr::{annualized_volatility_pct, calculate_atr};
pub use cross::{count_crosses, cross_at, Cross};
pub use ema::{calculate_ema, EmaSeries};
pub use snapshot::IndicatorSnapshot;
pub(crate) use snapshot::CrossingSeries;
pub use volume::{volume_average, volume_ratio};
