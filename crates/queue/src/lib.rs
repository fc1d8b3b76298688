pub mod error;
pub mod stream;

pub use error::StreamError;
pub use stream::{
    input_key, output_key, InMemoryStream, Stream, StreamEntry, StreamRegistry, FROM_START,
};
