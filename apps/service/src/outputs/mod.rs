//! Output plugins: `file`, `ws`, `zmq` and `influxdb`.

pub mod file;
pub mod influxdb;
pub mod ws;
pub mod zeromq;

use probehub::{Output, OutputConfig, Registry};

use file::FileOutput;
use influxdb::InfluxOutput;
use ws::WsOutput;
use zeromq::ZmqOutput;

fn boxed<O: Output + 'static>(output: O) -> Box<dyn Output> {
    Box::new(output)
}

/// Register every output type this binary ships.
pub fn register(registry: &mut Registry) {
    registry
        .register_output("file", |cfg: &OutputConfig| FileOutput::from_config(cfg).map(boxed))
        .register_output("ws", |cfg: &OutputConfig| WsOutput::from_config(cfg).map(boxed))
        .register_output("zmq", |cfg: &OutputConfig| ZmqOutput::from_config(cfg).map(boxed))
        .register_output("influxdb", |cfg: &OutputConfig| InfluxOutput::from_config(cfg).map(boxed));
}
