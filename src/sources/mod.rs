//! Upstream content sources.
//!
//! | Module | Source |
//! |--------|--------|
//! | [`podcast`] | iTunes directory lookup + RSS episodes |
//! | [`news`] | Alpha Vantage news with sentiment |
//! | [`rss`] | RSS 2.0 parsing used by [`podcast`] |

pub mod news;
pub mod podcast;
pub mod rss;

pub use news::{news_to_document, AlphaVantage, NewsFeed};
pub use podcast::{episode_to_document, ItunesDirectory, PodcastDirectory};
