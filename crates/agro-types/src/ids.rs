strong_type!(VolumeId, u64);
strong_type!(InodeId, u64);
