pub mod param_config;
