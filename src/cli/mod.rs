/// Attention variants selectable from the command line
pub mod attention;
