pub mod onnx_pipeline_factory;
