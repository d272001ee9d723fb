pub mod dtw;
pub mod grouping;
pub mod kaldi;
pub mod position;
pub mod posterior;
pub mod records;
pub mod report;
pub mod timing;
pub mod writer;
