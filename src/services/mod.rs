pub(crate) mod grading_client;
pub(crate) mod ocr;
pub(crate) mod pipeline;
pub(crate) mod response_parser;
pub(crate) mod result_store;
pub(crate) mod uploads;
