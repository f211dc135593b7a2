//! Data-fetching core of the Tally client.
//!
//! The engine never opens a connection itself: everything goes through a
//! [`Transport`]. On top of it sit the response normalizer, the paginated
//! list cache with its summary sibling, the invalidation that follows entry
//! creation, and the form validation that guards it.

pub use client::{ExpensesView, FetchStatus, QueryClient, SummaryView};
pub use error::EngineError;
pub use insight::{Rating, net_position_ratio, rating, savings_percent};
pub use money::{Grouping, format_currency};
pub use months::{MonthOption, last_12_months};
pub use normalize::{ExpensesPage, decode_page, normalize_page};
pub use pages::{PageMeta, PageSequence};
pub use query::{ChartFilters, ExpenseFilters, QueryCategory, QueryKey, SummaryQuery};
pub use region::Region;
pub use transport::{Params, Transport, TransportError};
pub use validation::{ExpenseDraft, Field, FieldError, MIN_AMOUNT, ValidationErrors};

mod client;
mod error;
mod insight;
mod money;
mod months;
mod normalize;
mod pages;
mod query;
mod region;
mod transport;
mod validation;
