mod codec_tests;
mod sms_gateway_tests;
