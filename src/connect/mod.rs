pub mod params;
pub mod resolver;

pub use params::AwsConnectionParams;
pub use resolver::AwsConnectionResolver;
