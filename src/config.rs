use serde_derive::Deserialize;
use serde_derive::Serialize;

use log::error;
use std::fs::File;
use std::io::prelude::*;

/// 服务端运行配置，从 TOML 配置文件加载。
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    worker_threads: usize,
    #[serde(default = "default_max_content_length")]
    max_content_length: u64,
    #[serde(default = "default_exception_if_not_managed")]
    exception_if_not_managed: bool,
}

fn default_max_content_length() -> u64 {
    1048576 // 1MB
}

fn default_exception_if_not_managed() -> bool {
    false
}

impl Config {
    pub fn new() -> Self {
        Self {
            worker_threads: 0,
            max_content_length: default_max_content_length(),
            exception_if_not_managed: default_exception_if_not_managed(),
        }
    }

    pub fn from_toml(filename: &str) -> Self {
        let mut file = match File::open(filename) {
            Ok(f) => f,
            Err(e) => panic!("no such file {} exception:{}", filename, e),
        };
        let mut str_val = String::new();
        match file.read_to_string(&mut str_val) {
            Ok(s) => s,
            Err(e) => panic!("Error Reading file: {}", e),
        };

        let mut raw_config = match toml::from_str(&str_val) {
            Ok(t) => t,
            Err(_) => {
                error!("无法成功从配置文件构建配置对象，使用默认配置");
                Config::new()
            }
        };
        if raw_config.worker_threads == 0 {
            raw_config.worker_threads = num_cpus::get();
        }
        raw_config
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn max_content_length(&self) -> u64 {
        self.max_content_length
    }

    pub fn exception_if_not_managed(&self) -> bool {
        self.exception_if_not_managed
    }
}
