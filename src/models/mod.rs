/// BiLSTM sequence tagger
pub mod bilstm;
