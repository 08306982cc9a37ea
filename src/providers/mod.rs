pub mod coingecko;
pub mod exchange_rate;
pub mod naver;
pub mod util;
pub mod yahoo_finance;

pub use coingecko::CoinGeckoProvider;
pub use exchange_rate::ExchangeRateApiProvider;
pub use naver::NaverProvider;
pub use yahoo_finance::YahooFinanceProvider;
