pub mod apng;
