//! Integration tests: full search runs against an in-memory market.

mod mock_market;
mod search_flow;
