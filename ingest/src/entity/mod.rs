pub mod usage_sample;
