pub mod gateway;
pub mod token;

pub use gateway::{CrmGateway, FollowUpSearch, HttpCrmGateway};
pub use token::{AccessTokenFetcher, HttpTokenFetcher, TokenService};
