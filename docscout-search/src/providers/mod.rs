//! Provider adapter implementations.

pub mod brave;
pub mod duckduckgo;
pub mod serper;
pub mod yandex;

pub use brave::BraveProvider;
pub use duckduckgo::DuckDuckGoProvider;
pub use serper::SerperProvider;
pub use yandex::YandexProvider;
