use std::fmt;

#[derive(Debug, Clone)]
pub enum IpLocateError {
    InvalidInput(String),
    NotFound(String),
    Config(String),
    DatabaseConfig(String),
    DatabaseConnection(String),
    DatabaseOperation(String),
    FileOperation(String),
    Fetch(String),
    Codec(String),
    Serialization(String),
}

impl IpLocateError {
    /// 获取错误代码
    pub fn code(&self) -> &'static str {
        match self {
            IpLocateError::InvalidInput(_) => "E001",
            IpLocateError::NotFound(_) => "E002",
            IpLocateError::Config(_) => "E003",
            IpLocateError::DatabaseConfig(_) => "E004",
            IpLocateError::DatabaseConnection(_) => "E005",
            IpLocateError::DatabaseOperation(_) => "E006",
            IpLocateError::FileOperation(_) => "E007",
            IpLocateError::Fetch(_) => "E008",
            IpLocateError::Codec(_) => "E009",
            IpLocateError::Serialization(_) => "E010",
        }
    }

    /// 获取错误类型名称
    pub fn error_type(&self) -> &'static str {
        match self {
            IpLocateError::InvalidInput(_) => "Invalid Input",
            IpLocateError::NotFound(_) => "Resource Not Found",
            IpLocateError::Config(_) => "Configuration Error",
            IpLocateError::DatabaseConfig(_) => "Database Configuration Error",
            IpLocateError::DatabaseConnection(_) => "Database Connection Error",
            IpLocateError::DatabaseOperation(_) => "Database Operation Error",
            IpLocateError::FileOperation(_) => "File Operation Error",
            IpLocateError::Fetch(_) => "Fetch Error",
            IpLocateError::Codec(_) => "Trie Codec Error",
            IpLocateError::Serialization(_) => "Serialization Error",
        }
    }

    /// 获取错误详情
    pub fn message(&self) -> &str {
        match self {
            IpLocateError::InvalidInput(msg)
            | IpLocateError::NotFound(msg)
            | IpLocateError::Config(msg)
            | IpLocateError::DatabaseConfig(msg)
            | IpLocateError::DatabaseConnection(msg)
            | IpLocateError::DatabaseOperation(msg)
            | IpLocateError::FileOperation(msg)
            | IpLocateError::Fetch(msg)
            | IpLocateError::Codec(msg)
            | IpLocateError::Serialization(msg) => msg,
        }
    }

    /// 存储类错误：刷新过程中出现即视为致命
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            IpLocateError::DatabaseConnection(_)
                | IpLocateError::DatabaseOperation(_)
                | IpLocateError::FileOperation(_)
                | IpLocateError::Fetch(_)
                | IpLocateError::Codec(_)
        )
    }

    /// 格式化为彩色输出（用于 Server 模式）
    pub fn format_colored(&self) -> String {
        use colored::Colorize;
        format!(
            "{} {} {}\n  {}",
            "[ERROR]".red().bold(),
            self.code().yellow(),
            self.error_type().red(),
            self.message().white()
        )
    }

    /// 格式化为简洁输出（用于 CLI 模式）
    pub fn format_simple(&self) -> String {
        format!("{}: {}", self.error_type(), self.message())
    }
}

impl fmt::Display for IpLocateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for IpLocateError {}

// 便捷的构造函数
impl IpLocateError {
    pub fn invalid_input<T: Into<String>>(msg: T) -> Self {
        IpLocateError::InvalidInput(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        IpLocateError::NotFound(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        IpLocateError::Config(msg.into())
    }

    pub fn database_config<T: Into<String>>(msg: T) -> Self {
        IpLocateError::DatabaseConfig(msg.into())
    }

    pub fn database_connection<T: Into<String>>(msg: T) -> Self {
        IpLocateError::DatabaseConnection(msg.into())
    }

    pub fn database_operation<T: Into<String>>(msg: T) -> Self {
        IpLocateError::DatabaseOperation(msg.into())
    }

    pub fn file_operation<T: Into<String>>(msg: T) -> Self {
        IpLocateError::FileOperation(msg.into())
    }

    pub fn fetch<T: Into<String>>(msg: T) -> Self {
        IpLocateError::Fetch(msg.into())
    }

    pub fn codec<T: Into<String>>(msg: T) -> Self {
        IpLocateError::Codec(msg.into())
    }

    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        IpLocateError::Serialization(msg.into())
    }
}

// 为常见的错误类型实现 From trait
impl From<sea_orm::DbErr> for IpLocateError {
    fn from(err: sea_orm::DbErr) -> Self {
        IpLocateError::DatabaseOperation(err.to_string())
    }
}

impl From<std::io::Error> for IpLocateError {
    fn from(err: std::io::Error) -> Self {
        IpLocateError::FileOperation(err.to_string())
    }
}

impl From<serde_json::Error> for IpLocateError {
    fn from(err: serde_json::Error) -> Self {
        IpLocateError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for IpLocateError {
    fn from(err: csv::Error) -> Self {
        IpLocateError::FileOperation(format!("CSV 读取失败: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, IpLocateError>;
