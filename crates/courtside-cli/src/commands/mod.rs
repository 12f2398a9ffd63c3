pub mod ask;
pub mod check;
pub mod history;

pub use ask::AskCommand;
pub use check::CheckCommand;
pub use history::HistoryCommand;
