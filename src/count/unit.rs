use std::fmt;

use aws_sdk_cloudwatch::types::StandardUnit;

/// Units accepted by CloudWatch metrics.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum CloudWatchUnit {
    Seconds,
    Microseconds,
    Milliseconds,
    Bytes,
    Kilobytes,
    Megabytes,
    Gigabytes,
    Terabytes,
    Bits,
    Kilobits,
    Megabits,
    Gigabits,
    Terabits,
    Percent,
    Count,
    BytesSecond,
    KilobytesSecond,
    MegabytesSecond,
    GigabytesSecond,
    TerabytesSecond,
    BitsSecond,
    KilobitsSecond,
    MegabitsSecond,
    GigabitsSecond,
    TerabitsSecond,
    CountSecond,
    None,
}

impl CloudWatchUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloudWatchUnit::Seconds => "Seconds",
            CloudWatchUnit::Microseconds => "Microseconds",
            CloudWatchUnit::Milliseconds => "Milliseconds",
            CloudWatchUnit::Bytes => "Bytes",
            CloudWatchUnit::Kilobytes => "Kilobytes",
            CloudWatchUnit::Megabytes => "Megabytes",
            CloudWatchUnit::Gigabytes => "Gigabytes",
            CloudWatchUnit::Terabytes => "Terabytes",
            CloudWatchUnit::Bits => "Bits",
            CloudWatchUnit::Kilobits => "Kilobits",
            CloudWatchUnit::Megabits => "Megabits",
            CloudWatchUnit::Gigabits => "Gigabits",
            CloudWatchUnit::Terabits => "Terabits",
            CloudWatchUnit::Percent => "Percent",
            CloudWatchUnit::Count => "Count",
            CloudWatchUnit::BytesSecond => "Bytes/Second",
            CloudWatchUnit::KilobytesSecond => "Kilobytes/Second",
            CloudWatchUnit::MegabytesSecond => "Megabytes/Second",
            CloudWatchUnit::GigabytesSecond => "Gigabytes/Second",
            CloudWatchUnit::TerabytesSecond => "Terabytes/Second",
            CloudWatchUnit::BitsSecond => "Bits/Second",
            CloudWatchUnit::KilobitsSecond => "Kilobits/Second",
            CloudWatchUnit::MegabitsSecond => "Megabits/Second",
            CloudWatchUnit::GigabitsSecond => "Gigabits/Second",
            CloudWatchUnit::TerabitsSecond => "Terabits/Second",
            CloudWatchUnit::CountSecond => "Count/Second",
            CloudWatchUnit::None => "None",
        }
    }
}

impl fmt::Display for CloudWatchUnit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<CloudWatchUnit> for StandardUnit {
    fn from(unit: CloudWatchUnit) -> Self {
        StandardUnit::from(unit.as_str())
    }
}
