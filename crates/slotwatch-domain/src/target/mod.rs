mod value_objects;


pub use value_objects::{Target, Timeslot, TimeslotParseError};
