//! The identifier space of graph objects and parameters.

pod::macros::id! {
    /// The id of a parameter kind.
    pub struct Param(u32) {
        UNKNOWN;
        INVALID = 0;
        PROP_INFO = 1;
        PROPS = 2;
        ENUM_FORMAT = 3;
        FORMAT = 4;
        BUFFERS = 5;
        META = 6;
        IO = 7;
        ENUM_PORT_CONFIG = 10;
        PORT_CONFIG = 11;
        LATENCY = 15;
        PROCESS_LATENCY = 16;
        TAG = 17;
    }

    /// The type of an object value.
    pub struct ObjectType(u32) {
        UNKNOWN;
        PROP_INFO = 1;
        PROPS = 2;
        FORMAT = 3;
        PARAM_BUFFERS = 4;
        PARAM_META = 5;
        PARAM_IO = 6;
        PARAM_PORT_CONFIG = 8;
        PARAM_LATENCY = 10;
        PARAM_PROCESS_LATENCY = 11;
        PARAM_TAG = 12;
    }

    /// Property keys in a format object.
    pub struct Format(u32) {
        UNKNOWN;
        MEDIA_TYPE = 1;
        MEDIA_SUB_TYPE = 2;
        AUDIO_FORMAT = 0x10001;
        AUDIO_RATE = 0x10003;
        AUDIO_CHANNELS = 0x10004;
        VIDEO_FORMAT = 0x20001;
        VIDEO_SIZE = 0x20003;
        VIDEO_FRAMERATE = 0x20004;
    }

    /// The major class of media on a port.
    pub struct MediaType(u32) {
        UNKNOWN;
        AUDIO = 1;
        VIDEO = 2;
        IMAGE = 3;
        BINARY = 4;
        STREAM = 5;
        APPLICATION = 6;
    }

    /// The sub class of media on a port.
    pub struct MediaSubType(u32) {
        UNKNOWN;
        RAW = 0x00001;
        DSP = 0x00002;
    }

    /// Property keys in a buffers object.
    pub struct ParamBuffers(u32) {
        UNKNOWN;
        BUFFERS = 1;
        BLOCKS = 2;
        SIZE = 3;
        STRIDE = 4;
        ALIGN = 5;
        DATA_TYPE = 6;
        META_TYPE = 7;
    }

    /// Property keys in a meta object.
    pub struct ParamMeta(u32) {
        UNKNOWN;
        TYPE = 1;
        SIZE = 2;
    }

    /// Property keys in an io object.
    pub struct ParamIo(u32) {
        UNKNOWN;
        ID = 1;
        SIZE = 2;
    }

    /// Property keys in a latency object.
    pub struct ParamLatency(u32) {
        UNKNOWN;
        DIRECTION = 1;
        MIN_QUANTUM = 2;
        MAX_QUANTUM = 3;
        MIN_RATE = 4;
        MAX_RATE = 5;
        MIN_NS = 6;
        MAX_NS = 7;
    }

    /// Property keys in a process-latency object.
    pub struct ParamProcessLatency(u32) {
        UNKNOWN;
        QUANTUM = 1;
        RATE = 2;
        NS = 3;
    }

    /// Property keys in a prop-info object.
    pub struct PropInfo(u32) {
        UNKNOWN;
        ID = 1;
        NAME = 2;
        TYPE = 3;
        LABELS = 4;
        CONTAINER = 5;
        PARAMS = 6;
        DESCRIPTION = 7;
    }

    /// Property keys of props objects, the controllable values of a node.
    pub struct Props(u32) {
        UNKNOWN;
        DEVICE = 101;
        VOLUME = 0x10003;
        MUTE = 0x10004;
        CHANNEL_VOLUMES = 0x10008;
        RATE = 0x10105;
        QUALITY = 0x10106;
    }

    /// The type of a memory region behind a data plane.
    pub struct DataType(u32) {
        UNKNOWN;
        INVALID = 0;
        MEM_PTR = 1;
        MEM_FD = 2;
        DMA_BUF = 3;
    }

    /// The type of buffer metadata.
    pub struct Meta(u32) {
        UNKNOWN;
        INVALID = 0;
        HEADER = 1;
        BUSY = 5;
    }

    /// The kind of io area installed on a node or port.
    pub struct IoType(u32) {
        UNKNOWN;
        INVALID = 0;
        BUFFERS = 1;
        RATE_MATCH = 3;
        CLOCK = 4;
        LATENCY = 5;
        CONTROL = 6;
        POSITION = 7;
    }

    /// A command sent to a node.
    pub struct NodeCommand(u32) {
        UNKNOWN;
        SUSPEND = 0;
        PAUSE = 1;
        START = 2;
        FLUSH = 4;
        DRAIN = 5;
    }

    /// The type of an out-of-band result.
    pub struct ResultType(u32) {
        UNKNOWN;
        SYNC = 1;
        NODE_PARAMS = 2;
    }
}
