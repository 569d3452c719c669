mod generate;
mod patch;
