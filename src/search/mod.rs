pub mod corpus;
pub mod overlap;
